//! Core LDIF reader module

pub mod attr;
pub mod change;
pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod iter;
pub mod plugin;
pub mod reader;
pub mod schema;

mod record;
mod source;
mod value;

pub use attr::{Attribute, AttributeBuilder, AttributeDescription};
pub use change::{ChangeRecord, Modification, ModificationType};
pub use config::{EntryFilter, ImportConfig, SharedSink};
pub use dn::{Ava, Dn, Rdn};
pub use entry::{AssemblyContext, Entry, EntryFactory, StandardEntryFactory};
pub use error::{LdifError, Result};
pub use iter::{ChangeRecords, Entries};
pub use plugin::{ImportPlugin, PluginVerdict};
pub use reader::{LdifReader, ReaderStatistics};
pub use schema::{
    AttributeType, ObjectClass, ObjectClassKind, Schema, Syntax, SyntaxPolicy,
};
