//! The main reader for LDIF sources.
//!
//! [`LdifReader`] frames records out of the configured byte streams and
//! parses them either as full entries or as change records. Records that
//! fail to parse are replayed to the reject channel with their reason;
//! records excluded by the import policy go to the skip channel. Counters
//! are atomic so statistics can be polled while parsing proceeds.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, trace, warn};

use super::change::{self, ChangeRecord, CHANGE_TYPES};
use super::config::{ImportConfig, SharedSink};
use super::dn::Dn;
use super::entry::{
    complete_rdn_attributes, validate_against_schema, AssemblyContext, Entry, EntryFactory,
    StandardEntryFactory,
};
use super::error::{LdifError, Result};
use super::iter::{ChangeRecords, Entries};
use super::plugin::PluginVerdict;
use super::record::Record;
use super::schema::Schema;
use super::source::LineSource;
use super::value::{colon_position, decode_value};

#[derive(Debug, Default)]
struct Counters {
    read: AtomicU64,
    ignored: AtomicU64,
    rejected: AtomicU64,
}

/// A cloneable handle onto a reader's counters.
///
/// The handle stays valid while the reader parses on another thread, so an
/// import pipeline can report progress without touching the reader itself.
#[derive(Debug, Clone, Default)]
pub struct ReaderStatistics {
    counters: Arc<Counters>,
}

impl ReaderStatistics {
    /// Entries read so far, including ignored and rejected ones.
    pub fn entries_read(&self) -> u64 {
        self.counters.read.load(Ordering::Relaxed)
    }

    /// Entries skipped because the import policy excluded them.
    pub fn entries_ignored(&self) -> u64 {
        self.counters.ignored.load(Ordering::Relaxed)
    }

    /// Entries rejected as invalid.
    pub fn entries_rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }
}

/// A streaming reader for LDIF entries and change records.
///
/// The reader owns its byte sources for its lifetime; closing it (or
/// dropping it) releases them. Its read operations are `&mut self` and not
/// meant to be interleaved from multiple threads; the statistics handle
/// and the reject side channel are safe to use concurrently.
pub struct LdifReader {
    config: ImportConfig,
    schema: Arc<Schema>,
    source: LineSource,
    entry_factory: Box<dyn EntryFactory>,
    statistics: ReaderStatistics,
    last_record: Option<Record>,
    last_entry_line: u64,
    closed: bool,
}

impl LdifReader {
    /// Creates a reader over the configuration's sources, decoding against
    /// the given schema.
    pub fn new(config: ImportConfig, schema: Arc<Schema>) -> Self {
        LdifReader::with_entry_factory(config, schema, Box::new(StandardEntryFactory))
    }

    /// Creates a reader that builds entries through a custom factory.
    pub fn with_entry_factory(
        config: ImportConfig,
        schema: Arc<Schema>,
        entry_factory: Box<dyn EntryFactory>,
    ) -> Self {
        info!(
            "Opening LDIF reader (schema validation: {}, syntax policy: {:?})",
            config.validates_schema(),
            config.syntax_policy()
        );
        if config.invokes_import_plugins() {
            for plugin in config.plugins() {
                plugin.begin_import_session();
            }
        }
        LdifReader {
            config,
            schema,
            source: LineSource::new(),
            entry_factory,
            statistics: ReaderStatistics::default(),
            last_record: None,
            last_entry_line: 0,
            closed: false,
        }
    }

    /// Reads the next entry, applying schema checking per the import
    /// configuration. Returns `None` at end of input.
    pub fn read_entry(&mut self) -> Result<Option<Entry>> {
        let check_schema = self.config.validates_schema();
        self.read_entry_with(check_schema)
    }

    /// Reads the next entry with explicit control over schema checking.
    pub fn read_entry_with(&mut self, check_schema: bool) -> Result<Option<Entry>> {
        loop {
            let mut record = match self.read_record_lines() {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(None),
                Err(e) => {
                    // A record attempt was made; keep the counter identity
                    // entries_read = emitted + ignored + rejected intact.
                    if matches!(e, LdifError::Parse { .. }) {
                        self.statistics.counters.read.fetch_add(1, Ordering::Relaxed);
                    }
                    return Err(e);
                }
            };

            record.skip_version_directive();
            if record.is_exhausted() {
                trace!(
                    "Record at line {} held only a version directive; reading on",
                    record.start_line()
                );
                continue;
            }
            self.statistics.counters.read.fetch_add(1, Ordering::Relaxed);

            let dn = match self.read_dn(&mut record) {
                Ok(dn) => dn,
                Err(e) => {
                    self.reject_record(record, &e);
                    return Err(e);
                }
            };

            if let Err(reason) = self.config.include_entry_dn(&dn) {
                debug!("Skipping record at line {}: {reason}", record.start_line());
                self.log_to_skip(&record, &reason);
                self.last_record = Some(record);
                continue;
            }

            let built = {
                let ctx = AssemblyContext {
                    schema: self.schema.as_ref(),
                    config: &self.config,
                    check_schema,
                    start_line: record.start_line(),
                };
                self.entry_factory.build_entry(dn, record.remaining(), &ctx)
            };
            let mut entry = match built {
                Ok(entry) => entry,
                Err(e) => {
                    self.reject_record(record, &e);
                    return Err(e);
                }
            };

            if check_schema {
                if let Err(e) =
                    validate_against_schema(&mut entry, &self.schema, record.start_line())
                {
                    self.reject_record(record, &e);
                    return Err(e);
                }
            }

            if let Err(reason) = self.config.include_entry(&entry) {
                debug!("Skipping entry '{}': {reason}", entry.dn());
                self.log_to_skip(&record, &reason);
                self.last_record = Some(record);
                continue;
            }

            if self.config.invokes_import_plugins() {
                if let Some(reason) = self.plugin_rejection(&entry) {
                    debug!("{reason}");
                    self.log_to_reject_record(&record, &reason);
                    self.last_record = Some(record);
                    continue;
                }
            }

            complete_rdn_attributes(&mut entry, &self.schema);
            trace!("Read entry '{}' starting at line {}", entry.dn(), record.start_line());
            self.last_record = Some(record);
            return Ok(Some(entry));
        }
    }

    /// Reads the next change record. With `default_add` set, a record with
    /// no `changetype:` line is treated as an add. Returns `None` at end of
    /// input.
    pub fn read_change_record(&mut self, default_add: bool) -> Result<Option<ChangeRecord>> {
        loop {
            let mut record = match self.read_record_lines() {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(None),
                Err(e) => {
                    // A record attempt was made; keep the counter identity
                    // entries_read = emitted + ignored + rejected intact.
                    if matches!(e, LdifError::Parse { .. }) {
                        self.statistics.counters.read.fetch_add(1, Ordering::Relaxed);
                    }
                    return Err(e);
                }
            };

            record.skip_version_directive();
            if record.is_exhausted() {
                continue;
            }
            self.statistics.counters.read.fetch_add(1, Ordering::Relaxed);

            let dn = match self.read_dn(&mut record) {
                Ok(dn) => dn,
                Err(e) => {
                    self.reject_record(record, &e);
                    return Err(e);
                }
            };

            let parsed = {
                let ctx = AssemblyContext {
                    schema: self.schema.as_ref(),
                    config: &self.config,
                    check_schema: self.config.validates_schema(),
                    start_line: record.start_line(),
                };
                match change::read_change_type(&mut record, &ctx) {
                    Err(e) => Err(e),
                    Ok(Some(change_type)) => match change_type.as_str() {
                        "add" => change::parse_add(dn, &mut record, &ctx),
                        "delete" => change::parse_delete(dn, &mut record, ctx.start_line),
                        "modify" => change::parse_modify(dn, &mut record, &ctx),
                        "modrdn" | "moddn" => change::parse_modify_dn(dn, &mut record, &ctx),
                        other => Err(LdifError::parse_fatal(
                            ctx.start_line,
                            format!(
                                "invalid changetype '{other}': expected one of {CHANGE_TYPES}"
                            ),
                        )),
                    },
                    Ok(None) if default_add => change::parse_add(dn, &mut record, &ctx),
                    Ok(None) => Err(LdifError::parse_fatal(
                        ctx.start_line,
                        format!("the record has no changetype: expected one of {CHANGE_TYPES}"),
                    )),
                }
            };

            match parsed {
                Ok(change) => {
                    trace!(
                        "Read change record for '{}' starting at line {}",
                        change.dn(),
                        record.start_line()
                    );
                    self.last_record = Some(record);
                    return Ok(Some(change));
                }
                Err(e) => {
                    self.reject_record(record, &e);
                    return Err(e);
                }
            }
        }
    }

    /// An iterator over the remaining entries.
    pub fn entries(&mut self) -> Entries<'_> {
        Entries::new(self)
    }

    /// An iterator over the remaining change records.
    pub fn change_records(&mut self, default_add: bool) -> ChangeRecords<'_> {
        ChangeRecords::new(self, default_add)
    }

    /// Entries read so far, including ignored and rejected ones.
    pub fn entries_read(&self) -> u64 {
        self.statistics.entries_read()
    }

    /// Entries skipped because the import policy excluded them.
    pub fn entries_ignored(&self) -> u64 {
        self.statistics.entries_ignored()
    }

    /// Entries rejected as invalid, including post-parse rejects.
    pub fn entries_rejected(&self) -> u64 {
        self.statistics.entries_rejected()
    }

    /// A cloneable statistics handle for polling from other threads.
    pub fn statistics(&self) -> ReaderStatistics {
        self.statistics.clone()
    }

    /// The line number the most recently framed record started on.
    pub fn last_entry_line_number(&self) -> u64 {
        self.last_entry_line
    }

    /// Rejects the record most recently read, replaying its lines to the
    /// reject channel. Intended for callers that validate entries beyond
    /// what the reader checks.
    pub fn reject_last_entry(&self, reason: &str) {
        self.statistics.counters.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(record) = &self.last_record {
            self.write_block(
                self.config.reject_writer(),
                record.header_lines(),
                record.remaining(),
                reason,
            );
        }
    }

    /// Rejects an already-parsed entry, rendering it back to record lines.
    /// Writes of the block are serialised on the shared reject sink, so
    /// worker threads may call this concurrently with parsing.
    pub fn reject_entry(&self, entry: &Entry, reason: &str) {
        self.statistics.counters.rejected.fetch_add(1, Ordering::Relaxed);
        let lines = entry.to_record_lines();
        self.write_block(self.config.reject_writer(), &[], &lines, reason);
    }

    /// Closes the reader: ends the plugin session, releases the byte
    /// sources and flushes the side channels. Closing twice is harmless.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.config.invokes_import_plugins() {
            for plugin in self.config.plugins() {
                plugin.end_import_session();
            }
        }
        self.source.release();
        self.config.close();
        info!(
            "LDIF reader closed: {} entries read, {} ignored, {} rejected",
            self.entries_read(),
            self.entries_ignored(),
            self.entries_rejected()
        );
    }

    /// Frames the next record: folds continuations, drops comments and
    /// blank separators, and rolls over to the next source at end of
    /// stream. Returns `None` at end of input.
    fn read_record_lines(&mut self) -> Result<Option<Record>> {
        let mut lines: Vec<String> = Vec::new();
        let mut start_line = 0;
        loop {
            match self.source.next_line()? {
                None => {
                    if !lines.is_empty() {
                        break;
                    }
                    if !self.source.advance(&mut self.config)? {
                        return Ok(None);
                    }
                }
                Some(line) => {
                    if line.is_empty() {
                        if !lines.is_empty() {
                            break;
                        }
                    } else if line.starts_with('#') {
                        // Comment line.
                    } else if line.starts_with(' ') || line.starts_with('\t') {
                        match lines.last_mut() {
                            Some(previous) => previous.push_str(&line[1..]),
                            None => {
                                let number = self.source.line_number();
                                let message = format!(
                                    "the line '{line}' begins with a space but has no \
                                     previous line to continue"
                                );
                                self.write_block(
                                    self.config.reject_writer(),
                                    &[],
                                    &lines,
                                    &message,
                                );
                                self.statistics
                                    .counters
                                    .rejected
                                    .fetch_add(1, Ordering::Relaxed);
                                return Err(LdifError::parse_fatal(number, message));
                            }
                        }
                    } else {
                        if lines.is_empty() {
                            start_line = self.source.line_number();
                            self.last_entry_line = start_line;
                        }
                        lines.push(line);
                    }
                }
            }
        }
        trace!("Framed {} logical lines starting at line {start_line}", lines.len());
        Ok(Some(Record::new(start_line, lines)))
    }

    /// Reads the record's header line as its DN.
    fn read_dn(&self, record: &mut Record) -> Result<Dn> {
        let start_line = record.start_line();
        let Some(line) = record.take_header() else {
            return Err(LdifError::parse(start_line, "the record is empty"));
        };
        let colon = colon_position(&line).ok_or_else(|| {
            LdifError::parse(
                start_line,
                format!("unable to parse an attribute name from the line '{line}'"),
            )
        })?;
        if !line[..colon].eq_ignore_ascii_case("dn") {
            return Err(LdifError::parse(
                start_line,
                format!("the record does not begin with a DN line: '{line}'"),
            ));
        }
        if colon == line.len() - 1 {
            return Ok(Dn::root());
        }
        let value = decode_value(&line, colon, &self.config).map_err(|e| {
            LdifError::parse(start_line, format!("unable to decode the DN value: {e}"))
        })?;
        let text = String::from_utf8(value)
            .map_err(|_| LdifError::parse(start_line, "the DN value is not valid UTF-8"))?;
        Dn::parse(&text)
            .map_err(|e| LdifError::parse(start_line, format!("unable to parse the DN '{text}': {e}")))
    }

    fn plugin_rejection(&self, entry: &Entry) -> Option<String> {
        for plugin in self.config.plugins() {
            if let PluginVerdict::Reject(message) = plugin.process_entry(entry) {
                return Some(match message {
                    Some(m) => {
                        format!("entry '{}' was rejected by an import plugin: {m}", entry.dn())
                    }
                    None => format!("entry '{}' was rejected by an import plugin", entry.dn()),
                });
            }
        }
        None
    }

    /// Routes a failed record to the reject channel and remembers it for
    /// [`reject_last_entry`](Self::reject_last_entry).
    fn reject_record(&mut self, record: Record, error: &LdifError) {
        let reason = match error {
            LdifError::Parse { message, .. } => message.clone(),
            other => other.to_string(),
        };
        self.log_to_reject_record(&record, &reason);
        self.last_record = Some(record);
    }

    fn log_to_reject_record(&self, record: &Record, reason: &str) {
        self.statistics.counters.rejected.fetch_add(1, Ordering::Relaxed);
        self.write_block(
            self.config.reject_writer(),
            record.header_lines(),
            record.remaining(),
            reason,
        );
    }

    fn log_to_skip(&self, record: &Record, reason: &str) {
        self.statistics.counters.ignored.fetch_add(1, Ordering::Relaxed);
        self.write_block(
            self.config.skip_writer(),
            record.header_lines(),
            record.remaining(),
            reason,
        );
    }

    /// Writes one side-channel block: `# reason`, the record lines, then a
    /// blank separator. Write failures are logged, never raised.
    fn write_block(
        &self,
        sink: Option<SharedSink>,
        header: &[String],
        body: &[String],
        reason: &str,
    ) {
        let Some(sink) = sink else {
            return;
        };
        let Ok(mut writer) = sink.lock() else {
            warn!("Side-channel sink lock poisoned; dropping a record block");
            return;
        };
        let mut block = String::new();
        if !reason.is_empty() {
            block.push_str("# ");
            block.push_str(reason);
            block.push('\n');
        }
        for line in header.iter().chain(body.iter()) {
            block.push_str(line);
            block.push('\n');
        }
        block.push('\n');
        if let Err(e) = writer.write_all(block.as_bytes()) {
            warn!("Failed to write a record block to a side channel: {e}");
        }
    }
}

impl Drop for LdifReader {
    fn drop(&mut self) {
        self.close();
    }
}
