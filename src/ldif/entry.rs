//! Directory entries and the record-to-entry assembler.
//!
//! Assembly walks the body lines of a framed record, groups values into
//! per-description builders, applies the import include/exclude policy and
//! the schema checks, and materialises the builders into an immutable
//! [`Entry`]. Builders never outlive the record parse.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{trace, warn};

use super::attr::{Attribute, AttributeBuilder, AttributeDescription};
use super::config::ImportConfig;
use super::dn::Dn;
use super::error::{LdifError, Result};
use super::schema::{AttributeType, ObjectClass, Schema, SyntaxPolicy};
use super::value::{colon_position, decode_value};

/// A directory entry: a DN, its object classes in declaration order, and
/// the user and operational attributes grouped by type.
#[derive(Debug, Clone)]
pub struct Entry {
    dn: Dn,
    object_classes: Vec<(Arc<ObjectClass>, String)>,
    user_attributes: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
    operational_attributes: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
}

impl Entry {
    /// The entry's distinguished name.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Object-class definitions with the names they were declared under,
    /// in declaration order.
    pub fn object_classes(&self) -> &[(Arc<ObjectClass>, String)] {
        &self.object_classes
    }

    /// The declared object-class names, in order.
    pub fn object_class_names(&self) -> impl Iterator<Item = &str> {
        self.object_classes.iter().map(|(_, name)| name.as_str())
    }

    /// Whether the entry declares (or inherited) the named object class.
    pub fn has_object_class(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        self.object_classes.iter().any(|(oc, _)| oc.key() == key)
    }

    /// User attributes grouped by type, in first-appearance order.
    pub fn user_attributes(&self) -> &[(Arc<AttributeType>, Vec<Attribute>)] {
        &self.user_attributes
    }

    /// Operational attributes grouped by type, in first-appearance order.
    pub fn operational_attributes(&self) -> &[(Arc<AttributeType>, Vec<Attribute>)] {
        &self.operational_attributes
    }

    /// All attributes of the entry, user buckets first.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.user_attributes
            .iter()
            .chain(self.operational_attributes.iter())
            .flat_map(|(_, attrs)| attrs.iter())
    }

    /// The first attribute whose type matches `name`, regardless of
    /// options.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        let key = name.to_ascii_lowercase();
        self.attributes()
            .find(|a| a.description().attribute_type().key() == key)
    }

    /// Whether any attribute of the entry has the given lowercase type key.
    pub fn has_attribute_key(&self, key: &str) -> bool {
        self.user_attributes
            .iter()
            .chain(self.operational_attributes.iter())
            .any(|(ty, _)| ty.key() == key)
    }

    pub(crate) fn new(
        dn: Dn,
        object_classes: Vec<(Arc<ObjectClass>, String)>,
        user_attributes: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
        operational_attributes: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
    ) -> Self {
        Entry { dn, object_classes, user_attributes, operational_attributes }
    }

    pub(crate) fn add_object_class(&mut self, object_class: Arc<ObjectClass>, name: String) {
        self.object_classes.push((object_class, name));
    }

    pub(crate) fn insert_attribute(&mut self, attribute: Attribute) {
        let ty = Arc::clone(attribute.description().attribute_type());
        let bucket = if ty.is_operational() {
            &mut self.operational_attributes
        } else {
            &mut self.user_attributes
        };
        match bucket.iter().position(|(t, _)| *t == ty) {
            Some(index) => bucket[index].1.push(attribute),
            None => bucket.push((ty, vec![attribute])),
        }
    }

    /// Renders the entry back to record lines for the reject channel.
    /// Values that would not survive the plain form are base64-encoded.
    pub(crate) fn to_record_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!("dn: {}", self.dn));
        for (_, name) in &self.object_classes {
            lines.push(format!("objectClass: {name}"));
        }
        for attribute in self.attributes() {
            let desc = attribute.description();
            for value in attribute.values() {
                lines.push(render_attribute_line(&desc.to_string(), value));
            }
        }
        lines
    }
}

fn render_attribute_line(description: &str, value: &[u8]) -> String {
    if value.is_empty() {
        return format!("{description}:");
    }
    match std::str::from_utf8(value) {
        Ok(text)
            if !text.starts_with(' ')
                && !text.starts_with(':')
                && !text.starts_with('<')
                && !text.ends_with(' ')
                && !text.contains(['\0', '\n', '\r']) =>
        {
            format!("{description}: {text}")
        }
        _ => format!("{description}:: {}", STANDARD.encode(value)),
    }
}

/// Shared state handed to the entry factory for one record.
pub struct AssemblyContext<'a> {
    /// The schema the record is decoded against.
    pub schema: &'a Schema,
    /// The import configuration (include/exclude policy, URL policy).
    pub config: &'a ImportConfig,
    /// Whether schema checking applies to this record.
    pub check_schema: bool,
    /// The line number the record started on, for error reporting.
    pub start_line: u64,
}

/// Strategy for turning a record's body lines into an entry.
///
/// The default, [`StandardEntryFactory`], performs plain LDIF assembly;
/// alternative factories can synthesise or transform entries while reusing
/// the reader's framing, filtering and side channels.
pub trait EntryFactory: Send + Sync {
    /// Builds the entry for a record whose DN has already been read.
    fn build_entry(&self, dn: Dn, lines: &[String], ctx: &AssemblyContext<'_>) -> Result<Entry>;
}

/// The default entry factory: one attribute per body line, grouped by
/// attribute description.
#[derive(Debug, Default)]
pub struct StandardEntryFactory;

impl EntryFactory for StandardEntryFactory {
    fn build_entry(&self, dn: Dn, lines: &[String], ctx: &AssemblyContext<'_>) -> Result<Entry> {
        let parts = assemble(&dn, lines, ctx, true)?;
        trace!("Assembled entry '{}'", dn);
        Ok(Entry::new(dn, parts.object_classes, parts.user, parts.operational))
    }
}

/// The grouped output of walking a record's attribute lines.
pub(crate) struct AssembledParts {
    pub(crate) object_classes: Vec<(Arc<ObjectClass>, String)>,
    pub(crate) user: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
    pub(crate) operational: Vec<(Arc<AttributeType>, Vec<Attribute>)>,
}

type BuilderBucket = Vec<(Arc<AttributeType>, Vec<AttributeBuilder>)>;

/// Walks the record's attribute lines and groups values into builders.
///
/// With `split_operational` unset (change-record adds), operational
/// attributes land in the user bucket alongside everything else.
pub(crate) fn assemble(
    dn: &Dn,
    lines: &[String],
    ctx: &AssemblyContext<'_>,
    split_operational: bool,
) -> Result<AssembledParts> {
    let mut object_classes: Vec<(Arc<ObjectClass>, String)> = Vec::new();
    let mut user: BuilderBucket = Vec::new();
    let mut operational: BuilderBucket = Vec::new();

    for line in lines {
        read_attribute_line(
            line,
            dn,
            ctx,
            &mut object_classes,
            &mut user,
            &mut operational,
            split_operational,
        )?;
    }

    Ok(AssembledParts {
        object_classes,
        user: materialize(user),
        operational: materialize(operational),
    })
}

fn materialize(bucket: BuilderBucket) -> Vec<(Arc<AttributeType>, Vec<Attribute>)> {
    bucket
        .into_iter()
        .map(|(ty, builders)| {
            let attrs = builders.into_iter().map(AttributeBuilder::into_attribute).collect();
            (ty, attrs)
        })
        .collect()
}

/// Decodes one attribute line and routes its value to the right bucket.
#[allow(clippy::too_many_arguments)]
fn read_attribute_line(
    line: &str,
    dn: &Dn,
    ctx: &AssemblyContext<'_>,
    object_classes: &mut Vec<(Arc<ObjectClass>, String)>,
    user: &mut BuilderBucket,
    operational: &mut BuilderBucket,
    split_operational: bool,
) -> Result<()> {
    let colon = colon_position(line).ok_or_else(|| {
        LdifError::parse(
            ctx.start_line,
            format!("unable to parse an attribute name from the line '{line}'"),
        )
    })?;
    let desc_str = &line[..colon];
    let description = AttributeDescription::parse(desc_str, ctx.schema)
        .map_err(|e| LdifError::parse(ctx.start_line, format!("entry '{dn}': {e}")))?;
    let attribute_type = Arc::clone(description.attribute_type());

    let value = decode_value(line, colon, ctx.config).map_err(|e| {
        LdifError::parse(
            ctx.start_line,
            format!("entry '{dn}', attribute '{desc_str}': {e}"),
        )
    })?;

    if attribute_type.is_object_class() {
        if !ctx.config.includes_object_classes() {
            trace!("Skipping object class value for entry '{dn}' per import configuration");
            return Ok(());
        }
        let name = String::from_utf8_lossy(&value).trim().to_string();
        let object_class = ctx.schema.object_class(&name);
        if object_classes.iter().any(|(oc, _)| oc.key() == object_class.key()) {
            warn!(
                "Duplicate object class '{}' for entry '{}' starting at line {}",
                name, dn, ctx.start_line
            );
        } else {
            object_classes.push((object_class, name));
        }
        return Ok(());
    }

    if !ctx.config.includes_attribute(&attribute_type) {
        trace!("Skipping attribute '{desc_str}' for entry '{dn}' per import configuration");
        return Ok(());
    }

    if ctx.check_schema
        && !attribute_type.syntax().is_ber_encoding_required()
        && description.has_option("binary")
    {
        return Err(LdifError::parse(
            ctx.start_line,
            format!(
                "entry '{dn}': attribute '{desc_str}' carries the binary option but its \
                 syntax does not use binary transfer"
            ),
        ));
    }

    if ctx.check_schema && ctx.config.syntax_policy() != SyntaxPolicy::Accept {
        if let Err(reason) = attribute_type.syntax().value_is_acceptable(&value) {
            let message = format!(
                "entry '{dn}': value of attribute '{desc_str}' violates the {} syntax: {reason}",
                attribute_type.syntax()
            );
            if ctx.config.syntax_policy() == SyntaxPolicy::Warn {
                warn!("{message}");
            } else {
                return Err(LdifError::parse(ctx.start_line, message));
            }
        }
    }

    let bucket = if split_operational && attribute_type.is_operational() {
        operational
    } else {
        user
    };

    let type_index = match bucket.iter().position(|(ty, _)| *ty == attribute_type) {
        Some(index) => index,
        None => {
            let mut builder = AttributeBuilder::new(description);
            builder.add(value);
            bucket.push((attribute_type, vec![builder]));
            return Ok(());
        }
    };
    let builders = &mut bucket[type_index].1;

    // Merge into an existing builder with the same option set, if any.
    for builder in builders.iter_mut() {
        if builder.description().options_equal(&description) {
            let added = builder.add(value.clone());
            if !added && ctx.check_schema {
                return Err(LdifError::parse(
                    ctx.start_line,
                    format!(
                        "entry '{dn}': duplicate value for attribute '{desc_str}'"
                    ),
                ));
            }
            if attribute_type.is_single_value() && builder.len() > 1 && ctx.check_schema {
                return Err(LdifError::parse(
                    ctx.start_line,
                    format!(
                        "entry '{dn}': multiple values for single-valued attribute '{desc_str}'"
                    ),
                ));
            }
            return Ok(());
        }
    }

    // No builder with this option set yet.
    let mut builder = AttributeBuilder::new(description);
    builder.add(value);
    builders.push(builder);
    Ok(())
}

/// Runs whole-entry schema conformance and pulls in any superior object
/// classes the record did not declare.
pub(crate) fn validate_against_schema(
    entry: &mut Entry,
    schema: &Schema,
    start_line: u64,
) -> Result<()> {
    if let Err(reason) = schema.check_entry_conformance(entry) {
        return Err(LdifError::parse(
            start_line,
            format!("entry '{}' violates the schema: {reason}", entry.dn()),
        ));
    }

    // Add superior classes missing from the declared set.
    let declared: Vec<Arc<ObjectClass>> =
        entry.object_classes().iter().map(|(oc, _)| Arc::clone(oc)).collect();
    for object_class in declared {
        for superior in schema.superior_chain(&object_class) {
            if !entry.has_object_class(superior.key()) {
                trace!(
                    "Adding inherited object class '{}' to entry '{}'",
                    superior.name(),
                    entry.dn()
                );
                let name = superior.name().to_string();
                entry.add_object_class(superior, name);
            }
        }
    }
    Ok(())
}

/// Ensures every AVA of the entry's RDN is materially present in the
/// attribute maps, appending missing values.
pub(crate) fn complete_rdn_attributes(entry: &mut Entry, schema: &Schema) {
    let Some(rdn) = entry.dn().rdn().cloned() else {
        return;
    };
    for ava in rdn.avas() {
        let attribute_type = schema.attribute_type(ava.attribute_name());
        let value = ava.value().to_vec();
        add_rdn_attribute(entry, attribute_type, &value);
    }
}

fn add_rdn_attribute(entry: &mut Entry, attribute_type: Arc<AttributeType>, value: &[u8]) {
    let bucket = if attribute_type.is_operational() {
        &mut entry.operational_attributes
    } else {
        &mut entry.user_attributes
    };

    let type_index = match bucket.iter().position(|(ty, _)| *ty == attribute_type) {
        Some(index) => index,
        None => {
            let ty = Arc::clone(&attribute_type);
            let description = AttributeDescription::of_type(attribute_type);
            let mut builder = AttributeBuilder::new(description);
            builder.add(value.to_vec());
            bucket.push((ty, vec![builder.into_attribute()]));
            return;
        }
    };
    let attrs = &mut bucket[type_index].1;

    for attribute in attrs.iter_mut() {
        if attribute.description().has_options() {
            continue;
        }
        if !attribute.contains(value) {
            // Value-add into the existing option-less attribute, keeping
            // its other values.
            let mut builder = AttributeBuilder::from_attribute(attribute);
            builder.add(value.to_vec());
            *attribute = builder.into_attribute();
        }
        return;
    }

    // Every existing attribute for the type carries options; append a
    // fresh option-less one.
    let description = AttributeDescription::of_type(attribute_type);
    let mut builder = AttributeBuilder::new(description);
    builder.add(value.to_vec());
    attrs.push(builder.into_attribute());
}
