//! Streaming reader for RFC 2849 LDIF.
//!
//! LDIF is the line-oriented text format directory servers use to exchange
//! entries and change records. This crate reads an LDIF stream and yields
//! either full [`Entry`] values (bulk import) or [`ChangeRecord`] values
//! (add / delete / modify / modify-DN) for replay against a directory.
//!
//! The reader handles the quirks of real-world LDIF: continuation lines
//! (space or tab), comments, a UTF-8 byte-order mark on the first line,
//! `version:` directives, base64 and URL-referenced values, and multiple
//! concatenated sources. Decoding is schema-aware through a [`Schema`]
//! handle, and an [`ImportConfig`] controls which entries and attributes
//! are kept; excluded records go to a skip channel and malformed records
//! to a reject channel, each replayed verbatim with the reason.
//!
//! # Getting started
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use ldif_reader::{ImportConfig, LdifReader, Schema};
//!
//! let ldif = "\
//! dn: dc=example
//! objectClass: top
//! objectClass: domain
//! dc: example
//!
//! ";
//! let config = ImportConfig::new().add_source(Cursor::new(ldif.as_bytes().to_vec()));
//! let mut reader = LdifReader::new(config, Arc::new(Schema::core()));
//!
//! let entry = reader.read_entry()?.expect("one entry");
//! assert_eq!(entry.dn().to_string(), "dc=example");
//! assert!(entry.has_object_class("domain"));
//! assert!(reader.read_entry()?.is_none());
//! # Ok::<(), ldif_reader::LdifError>(())
//! ```
//!
//! Change records are read the same way through
//! [`LdifReader::read_change_record`], or iterated with
//! [`LdifReader::change_records`].
//!
//! # Error handling
//!
//! I/O failures surface unchanged as [`LdifError::Io`]. Malformed records
//! raise [`LdifError::Parse`] carrying the record's starting line number
//! and whether reading can continue; the offending record is replayed to
//! the reject channel when one is configured. Callers typically log the
//! error and keep reading.

pub mod ldif;

pub use ldif::{
    AssemblyContext, Attribute, AttributeBuilder, AttributeDescription, AttributeType, Ava,
    ChangeRecord, ChangeRecords, Dn, Entries, Entry, EntryFactory, EntryFilter, ImportConfig,
    ImportPlugin, LdifError, LdifReader, Modification, ModificationType, ObjectClass,
    ObjectClassKind, PluginVerdict, Rdn, ReaderStatistics, Result, Schema, SharedSink,
    StandardEntryFactory, Syntax, SyntaxPolicy,
};
