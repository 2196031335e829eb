//! Import plugin hooks.
//!
//! Plugins are notified when an import session starts and ends, and may
//! veto individual entries as they are read. A vetoed entry is written to
//! the reject channel and skipped.

use super::entry::Entry;

/// A plugin's decision about one imported entry.
#[derive(Debug, Clone)]
pub enum PluginVerdict {
    /// Keep processing the entry.
    Continue,
    /// Reject the entry, optionally with a reason for the reject channel.
    Reject(Option<String>),
}

/// Hook invoked around an import session and for each entry read.
///
/// All methods have no-op defaults so implementations only override what
/// they care about.
pub trait ImportPlugin: Send + Sync {
    /// Called once when the reader is created with plugins enabled.
    fn begin_import_session(&self) {}

    /// Called once when the reader is closed.
    fn end_import_session(&self) {}

    /// Called for each entry that passed the import filters.
    fn process_entry(&self, entry: &Entry) -> PluginVerdict {
        let _ = entry;
        PluginVerdict::Continue
    }
}
