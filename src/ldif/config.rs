//! Import configuration: what to read, what to keep, where rejects go.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::dn::Dn;
use super::entry::Entry;
use super::plugin::ImportPlugin;
use super::schema::{AttributeType, SyntaxPolicy};

/// A line-oriented sink shared between the reader and worker threads.
///
/// Writes of one record block are serialised by the mutex.
pub type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// A predicate applied to fully assembled entries.
pub type EntryFilter = Box<dyn Fn(&Entry) -> bool + Send + Sync>;

enum SourceInput {
    Reader(Box<dyn Read + Send>),
    /// A path opened lazily when the reader rolls over to it.
    Path(PathBuf),
}

/// Configuration for one LDIF import: the byte sources to read, the
/// include/exclude policy, schema-related toggles, and the optional reject
/// and skip side channels.
///
/// Built with chained setters:
///
/// ```
/// use ldif_reader::ImportConfig;
/// use ldif_reader::Dn;
/// use std::io::Cursor;
///
/// let config = ImportConfig::new()
///     .add_source(Cursor::new(b"dn: dc=example\n\n".to_vec()))
///     .exclude_branch(Dn::parse("ou=tmp,dc=example").unwrap())
///     .exclude_attribute("userPassword");
/// ```
pub struct ImportConfig {
    sources: VecDeque<SourceInput>,
    include_branches: Vec<Dn>,
    exclude_branches: Vec<Dn>,
    include_attributes: HashSet<String>,
    exclude_attributes: HashSet<String>,
    include_object_classes: bool,
    validate_schema: bool,
    syntax_policy: SyntaxPolicy,
    invoke_import_plugins: bool,
    plugins: Vec<Arc<dyn ImportPlugin>>,
    entry_filters: Vec<EntryFilter>,
    allowed_url_schemes: Vec<String>,
    reject_writer: Option<SharedSink>,
    skip_writer: Option<SharedSink>,
    closed: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            sources: VecDeque::new(),
            include_branches: Vec::new(),
            exclude_branches: Vec::new(),
            include_attributes: HashSet::new(),
            exclude_attributes: HashSet::new(),
            include_object_classes: true,
            validate_schema: true,
            syntax_policy: SyntaxPolicy::Accept,
            invoke_import_plugins: false,
            plugins: Vec::new(),
            entry_filters: Vec::new(),
            allowed_url_schemes: vec!["file".to_string()],
            reject_writer: None,
            skip_writer: None,
            closed: false,
        }
    }
}

impl ImportConfig {
    /// A configuration with no sources and permissive defaults: schema
    /// validation on, syntax policy `Accept`, object classes included,
    /// plugins off, only `file:` URLs allowed.
    pub fn new() -> Self {
        ImportConfig::default()
    }

    /// Appends a byte stream to read after any previously added source.
    pub fn add_source(mut self, reader: impl Read + Send + 'static) -> Self {
        self.sources.push_back(SourceInput::Reader(Box::new(reader)));
        self
    }

    /// Appends a file path, opened when the reader reaches it.
    pub fn add_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push_back(SourceInput::Path(path.into()));
        self
    }

    /// Restricts the import to entries at or below `base`. May be called
    /// multiple times; an entry must match one of the bases.
    pub fn include_branch(mut self, base: Dn) -> Self {
        self.include_branches.push(base);
        self
    }

    /// Excludes entries at or below `base`.
    pub fn exclude_branch(mut self, base: Dn) -> Self {
        self.exclude_branches.push(base);
        self
    }

    /// Restricts imported attributes to the named types. May be called
    /// multiple times.
    pub fn include_attribute(mut self, name: &str) -> Self {
        self.include_attributes.insert(name.to_ascii_lowercase());
        self
    }

    /// Excludes the named attribute type from imported entries.
    pub fn exclude_attribute(mut self, name: &str) -> Self {
        self.exclude_attributes.insert(name.to_ascii_lowercase());
        self
    }

    /// Whether object-class values are kept on imported entries.
    pub fn with_object_classes(mut self, include: bool) -> Self {
        self.include_object_classes = include;
        self
    }

    /// Whether entries are checked against the schema as they are read.
    pub fn with_schema_validation(mut self, validate: bool) -> Self {
        self.validate_schema = validate;
        self
    }

    /// How syntax-violating attribute values are treated.
    pub fn with_syntax_policy(mut self, policy: SyntaxPolicy) -> Self {
        self.syntax_policy = policy;
        self
    }

    /// Whether import plugins are invoked around the session and per entry.
    pub fn with_import_plugins(mut self, invoke: bool) -> Self {
        self.invoke_import_plugins = invoke;
        self
    }

    /// Registers an import plugin. Plugins only run when
    /// [`with_import_plugins`](Self::with_import_plugins) enabled them.
    pub fn add_plugin(mut self, plugin: Arc<dyn ImportPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds a predicate applied to each fully assembled entry; entries for
    /// which it returns `false` are skipped.
    pub fn add_entry_filter(
        mut self,
        filter: impl Fn(&Entry) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.entry_filters.push(Box::new(filter));
        self
    }

    /// Permits an additional URL scheme for URL-referenced values.
    /// `file` is permitted by default.
    pub fn allow_url_scheme(mut self, scheme: &str) -> Self {
        self.allowed_url_schemes.push(scheme.to_ascii_lowercase());
        self
    }

    /// Installs the reject sink: records that fail to parse are replayed
    /// here with their reason.
    pub fn with_reject_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.reject_writer = Some(Arc::new(Mutex::new(Box::new(writer))));
        self
    }

    /// Installs the skip sink: records excluded by policy are replayed
    /// here with their reason.
    pub fn with_skip_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.skip_writer = Some(Arc::new(Mutex::new(Box::new(writer))));
        self
    }

    // --- Contract consumed by the reader ---

    /// Hands out the next byte source, opening lazily-added files.
    /// Returns `None` at end of input.
    pub fn next_source(&mut self) -> std::io::Result<Option<Box<dyn Read + Send>>> {
        match self.sources.pop_front() {
            None => Ok(None),
            Some(SourceInput::Reader(reader)) => Ok(Some(reader)),
            Some(SourceInput::Path(path)) => {
                debug!("Opening LDIF source {}", path.display());
                let file = File::open(&path)?;
                Ok(Some(Box::new(file)))
            }
        }
    }

    /// First-stage inclusion check on the entry DN alone. Returns the
    /// exclusion reason when the entry must be skipped.
    pub fn include_entry_dn(&self, dn: &Dn) -> Result<(), String> {
        for base in &self.exclude_branches {
            if dn.is_descendant_of(base) {
                return Err(format!("entry '{dn}' is within the excluded branch '{base}'"));
            }
        }
        if !self.include_branches.is_empty()
            && !self.include_branches.iter().any(|base| dn.is_descendant_of(base))
        {
            return Err(format!("entry '{dn}' is not within any included branch"));
        }
        Ok(())
    }

    /// Second-stage inclusion check on the fully assembled entry.
    pub fn include_entry(&self, entry: &Entry) -> Result<(), String> {
        for filter in &self.entry_filters {
            if !filter(entry) {
                return Err(format!(
                    "entry '{}' was excluded by an import filter",
                    entry.dn()
                ));
            }
        }
        Ok(())
    }

    /// Whether object-class values are kept on imported entries.
    pub fn includes_object_classes(&self) -> bool {
        self.include_object_classes
    }

    /// Whether the given attribute type survives the include/exclude policy.
    pub fn includes_attribute(&self, attribute_type: &AttributeType) -> bool {
        let key = attribute_type.key();
        let oid = attribute_type.oid();
        if self.exclude_attributes.contains(key) || self.exclude_attributes.contains(oid) {
            return false;
        }
        if !self.include_attributes.is_empty() {
            return self.include_attributes.contains(key) || self.include_attributes.contains(oid);
        }
        true
    }

    /// Whether entries are checked against the schema.
    pub fn validates_schema(&self) -> bool {
        self.validate_schema
    }

    /// The configured syntax-enforcement policy.
    pub fn syntax_policy(&self) -> SyntaxPolicy {
        self.syntax_policy
    }

    /// Whether import plugins participate in this import.
    pub fn invokes_import_plugins(&self) -> bool {
        self.invoke_import_plugins
    }

    /// The registered import plugins.
    pub fn plugins(&self) -> &[Arc<dyn ImportPlugin>] {
        &self.plugins
    }

    /// Whether a URL scheme is permitted for URL-referenced values.
    pub fn url_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_url_schemes.iter().any(|s| s == scheme)
    }

    /// The reject sink, if one is installed.
    pub fn reject_writer(&self) -> Option<SharedSink> {
        self.reject_writer.as_ref().map(Arc::clone)
    }

    /// The skip sink, if one is installed.
    pub fn skip_writer(&self) -> Option<SharedSink> {
        self.skip_writer.as_ref().map(Arc::clone)
    }

    /// Releases all pending sources and flushes the side-channel sinks.
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sources.clear();
        for sink in [&self.reject_writer, &self.skip_writer].into_iter().flatten() {
            match sink.lock() {
                Ok(mut writer) => {
                    if let Err(e) = writer.flush() {
                        warn!("Failed to flush side-channel sink on close: {e}");
                    }
                }
                Err(_) => warn!("Side-channel sink lock poisoned during close"),
            }
        }
    }
}

impl fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("pending_sources", &self.sources.len())
            .field("include_branches", &self.include_branches)
            .field("exclude_branches", &self.exclude_branches)
            .field("include_attributes", &self.include_attributes)
            .field("exclude_attributes", &self.exclude_attributes)
            .field("include_object_classes", &self.include_object_classes)
            .field("validate_schema", &self.validate_schema)
            .field("syntax_policy", &self.syntax_policy)
            .field("invoke_import_plugins", &self.invoke_import_plugins)
            .field("plugins", &self.plugins.len())
            .field("entry_filters", &self.entry_filters.len())
            .field("allowed_url_schemes", &self.allowed_url_schemes)
            .field("has_reject_writer", &self.reject_writer.is_some())
            .field("has_skip_writer", &self.skip_writer.is_some())
            .finish()
    }
}
