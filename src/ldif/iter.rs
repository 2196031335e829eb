//! Iterators for sequential access to a reader's entries and changes.
//!
//! Both iterators borrow the reader mutably and simply drive the
//! corresponding read operation. Errors are yielded as items: a parse
//! error with `can_continue` set leaves the iterator usable, so callers
//! can keep consuming records after logging the failure.

use super::change::ChangeRecord;
use super::entry::Entry;
use super::error::Result;
use super::reader::LdifReader;

/// Iterator over the entries of an LDIF source.
///
/// Created by [`LdifReader::entries()`](crate::LdifReader::entries).
pub struct Entries<'a> {
    reader: &'a mut LdifReader,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(reader: &'a mut LdifReader) -> Self {
        Entries { reader }
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterator over the change records of an LDIF source.
///
/// Created by
/// [`LdifReader::change_records()`](crate::LdifReader::change_records).
pub struct ChangeRecords<'a> {
    reader: &'a mut LdifReader,
    default_add: bool,
}

impl<'a> ChangeRecords<'a> {
    pub(crate) fn new(reader: &'a mut LdifReader, default_add: bool) -> Self {
        ChangeRecords { reader, default_add }
    }
}

impl Iterator for ChangeRecords<'_> {
    type Item = Result<ChangeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_change_record(self.default_add) {
            Ok(Some(change)) => Some(Ok(change)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
