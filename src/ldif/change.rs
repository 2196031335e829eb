//! Change records: the `changetype:` grammar and its per-type sub-grammars.

use std::fmt;

use log::trace;

use super::attr::{Attribute, AttributeBuilder, AttributeDescription};
use super::dn::{Dn, Rdn};
use super::entry::{
    assemble, complete_rdn_attributes, validate_against_schema, AssemblyContext, Entry,
};
use super::error::{LdifError, Result};
use super::record::Record;
use super::value::{colon_position, decode_value};

/// The permitted change types, used in error messages.
pub(crate) const CHANGE_TYPES: &str = "add, delete, modify, moddn, modrdn";
const MODIFICATION_TYPES: &str = "add, delete, replace, increment";

/// The operation of one modification within a modify change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
    Increment,
}

impl ModificationType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "add" => Some(ModificationType::Add),
            "delete" => Some(ModificationType::Delete),
            "replace" => Some(ModificationType::Replace),
            "increment" => Some(ModificationType::Increment),
            _ => None,
        }
    }
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModificationType::Add => "add",
            ModificationType::Delete => "delete",
            ModificationType::Replace => "replace",
            ModificationType::Increment => "increment",
        };
        write!(f, "{name}")
    }
}

/// One modification of a modify change record: the operation plus the
/// attribute (description and values) it applies to.
#[derive(Debug, Clone)]
pub struct Modification {
    modification_type: ModificationType,
    attribute: Attribute,
}

impl Modification {
    /// The operation to apply.
    pub fn modification_type(&self) -> ModificationType {
        self.modification_type
    }

    /// The attribute the operation applies to.
    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }
}

/// A parsed LDIF change record.
#[derive(Debug, Clone)]
pub enum ChangeRecord {
    /// Add the given entry.
    Add(Entry),
    /// Delete the entry with the given DN.
    Delete(Dn),
    /// Apply the modifications, in source order, to the entry.
    Modify {
        dn: Dn,
        modifications: Vec<Modification>,
    },
    /// Rename and/or move the entry.
    ModifyDn {
        dn: Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    },
}

impl ChangeRecord {
    /// The DN the change applies to.
    pub fn dn(&self) -> &Dn {
        match self {
            ChangeRecord::Add(entry) => entry.dn(),
            ChangeRecord::Delete(dn) => dn,
            ChangeRecord::Modify { dn, .. } => dn,
            ChangeRecord::ModifyDn { dn, .. } => dn,
        }
    }
}

/// Parses the remaining record body as an add change record.
///
/// Attribute assembly follows the entry rules, except that operational
/// attributes are not split out and the configuration filters are not
/// replayed; object-class values are reconstructed as a single attribute
/// under the object-class type.
pub(crate) fn parse_add(dn: Dn, record: &mut Record, ctx: &AssemblyContext<'_>) -> Result<ChangeRecord> {
    let parts = assemble(&dn, record.remaining(), ctx, false)?;
    let mut entry = Entry::new(dn, parts.object_classes, parts.user, parts.operational);

    // Reconstruct the objectClass attribute from the declared names. A
    // record declaring none still gets the attribute, with zero values.
    let object_class_type = ctx.schema.attribute_type("objectClass");
    if !entry.has_attribute_key(object_class_type.key()) {
        let description = AttributeDescription::of_type(object_class_type);
        let mut builder = AttributeBuilder::new(description);
        let names: Vec<String> = entry.object_class_names().map(str::to_string).collect();
        for name in names {
            builder.add(name.into_bytes());
        }
        entry.insert_attribute(builder.into_attribute());
    }

    if ctx.check_schema {
        validate_against_schema(&mut entry, ctx.schema, ctx.start_line)?;
    }
    complete_rdn_attributes(&mut entry, ctx.schema);
    trace!("Parsed add change record for '{}'", entry.dn());
    Ok(ChangeRecord::Add(entry))
}

/// Parses a delete change record: the body must be empty.
pub(crate) fn parse_delete(dn: Dn, record: &mut Record, start_line: u64) -> Result<ChangeRecord> {
    if !record.is_exhausted() {
        return Err(LdifError::parse(
            start_line,
            "a delete change record cannot carry attribute lines",
        ));
    }
    Ok(ChangeRecord::Delete(dn))
}

/// Parses a modify change record: repeated `<op>: <attrdesc>` groups, each
/// terminated by a line holding exactly `-`.
pub(crate) fn parse_modify(
    dn: Dn,
    record: &mut Record,
    ctx: &AssemblyContext<'_>,
) -> Result<ChangeRecord> {
    let mut modifications = Vec::new();

    while let Some(line) = record.next_body_line() {
        let colon = colon_position(&line).ok_or_else(|| {
            LdifError::parse(
                ctx.start_line,
                format!("unable to parse an attribute name from the line '{line}'"),
            )
        })?;
        let op_name = line[..colon].trim();
        let modification_type = ModificationType::parse(op_name).ok_or_else(|| {
            LdifError::parse(
                ctx.start_line,
                format!(
                    "invalid modification type '{op_name}': expected one of {MODIFICATION_TYPES}"
                ),
            )
        })?;

        let target = decode_value(&line, colon, ctx.config)
            .map_err(|e| LdifError::parse(ctx.start_line, e))?;
        let target = String::from_utf8(target).map_err(|_| {
            LdifError::parse(
                ctx.start_line,
                format!("the attribute description of a '{op_name}' modification is not UTF-8"),
            )
        })?;
        let description = AttributeDescription::parse(target.trim(), ctx.schema)
            .map_err(|e| LdifError::parse(ctx.start_line, e))?;

        let mut builder = AttributeBuilder::new(description.clone());
        while let Some(value_line) = record.next_body_line() {
            if value_line == "-" {
                break;
            }
            let (_, value) =
                read_single_value_attribute(&value_line, Some(&description), ctx)?;
            // Duplicate values within one modification are collapsed.
            builder.add(value);
        }

        trace!(
            "Parsed '{}' modification of '{}' for entry '{}'",
            modification_type,
            description,
            dn
        );
        modifications.push(Modification { modification_type, attribute: builder.into_attribute() });
    }

    Ok(ChangeRecord::Modify { dn, modifications })
}

/// Parses a modify-DN change record: `newrdn`, `deleteoldrdn`, and an
/// optional `newsuperior`.
pub(crate) fn parse_modify_dn(
    dn: Dn,
    record: &mut Record,
    ctx: &AssemblyContext<'_>,
) -> Result<ChangeRecord> {
    let Some(line) = record.next_body_line() else {
        return Err(LdifError::parse(
            ctx.start_line,
            "a modify DN change record requires a 'newrdn' line",
        ));
    };
    let new_rdn_value = expect_named_value(&line, "newrdn", ctx)?;
    let new_rdn = Rdn::parse(&new_rdn_value).map_err(|e| {
        LdifError::parse(ctx.start_line, format!("unable to parse the new RDN: {e}"))
    })?;

    let Some(line) = record.next_body_line() else {
        return Err(LdifError::parse(
            ctx.start_line,
            "a modify DN change record requires a 'deleteoldrdn' line",
        ));
    };
    let delete_value = expect_named_value(&line, "deleteoldrdn", ctx)?;
    let delete_old_rdn = match delete_value.to_ascii_lowercase().as_str() {
        "false" | "no" | "0" => false,
        "true" | "yes" | "1" => true,
        other => {
            return Err(LdifError::parse(
                ctx.start_line,
                format!("invalid 'deleteoldrdn' value '{other}'"),
            ));
        }
    };

    let new_superior = match record.next_body_line() {
        Some(line) => {
            let value = expect_named_value(&line, "newsuperior", ctx)?;
            Some(Dn::parse(&value).map_err(|e| {
                LdifError::parse(
                    ctx.start_line,
                    format!("unable to parse the new superior DN: {e}"),
                )
            })?)
        }
        None => None,
    };

    Ok(ChangeRecord::ModifyDn { dn, new_rdn, delete_old_rdn, new_superior })
}

/// Decodes one `attrdesc: value` line, checking the description against an
/// expected one when given. Returns the description and the raw value.
fn read_single_value_attribute(
    line: &str,
    expected: Option<&AttributeDescription>,
    ctx: &AssemblyContext<'_>,
) -> Result<(AttributeDescription, Vec<u8>)> {
    let colon = colon_position(line).ok_or_else(|| {
        LdifError::parse(
            ctx.start_line,
            format!("unable to parse an attribute name from the line '{line}'"),
        )
    })?;
    let description = AttributeDescription::parse(&line[..colon], ctx.schema)
        .map_err(|e| LdifError::parse(ctx.start_line, e))?;

    if let Some(expected) = expected {
        if !description.matches(expected) {
            return Err(LdifError::parse_fatal(
                ctx.start_line,
                format!(
                    "invalid attribute '{description}' in the change record: expected '{expected}'"
                ),
            ));
        }
    }

    let value = decode_value(line, colon, ctx.config)
        .map_err(|e| LdifError::parse(ctx.start_line, e))?;
    Ok((description, value))
}

/// Decodes a `<name>: value` line whose description must be exactly `name`
/// with no options, returning the value as text.
fn expect_named_value(line: &str, name: &str, ctx: &AssemblyContext<'_>) -> Result<String> {
    let expected = AttributeDescription::parse(name, ctx.schema)
        .map_err(|e| LdifError::parse(ctx.start_line, e))?;
    let (_, value) = read_single_value_attribute(line, Some(&expected), ctx)?;
    String::from_utf8(value).map_err(|_| {
        LdifError::parse(ctx.start_line, format!("the '{name}' value is not valid UTF-8"))
    })
}

/// Reads the `changetype:` header, if the record carries one. Leaves the
/// record untouched when the next line is some other attribute.
pub(crate) fn read_change_type(
    record: &mut Record,
    ctx: &AssemblyContext<'_>,
) -> Result<Option<String>> {
    let Some(line) = record.peek() else {
        return Ok(None);
    };
    let colon = colon_position(line).ok_or_else(|| {
        LdifError::parse(
            ctx.start_line,
            format!("unable to parse an attribute name from the line '{line}'"),
        )
    })?;
    if !line[..colon].eq_ignore_ascii_case("changetype") {
        return Ok(None);
    }

    let Some(line) = record.take_header() else {
        return Ok(None);
    };
    if colon == line.len() - 1 {
        return Err(LdifError::parse_fatal(
            ctx.start_line,
            format!("missing changetype value: expected one of {CHANGE_TYPES}"),
        ));
    }
    let value = decode_value(&line, colon, ctx.config)
        .map_err(|e| LdifError::parse(ctx.start_line, e))?;
    let value = String::from_utf8(value).map_err(|_| {
        LdifError::parse(ctx.start_line, "the changetype value is not valid UTF-8")
    })?;
    Ok(Some(value))
}
