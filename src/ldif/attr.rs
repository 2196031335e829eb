//! Attribute descriptions, attributes and streaming builders.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::schema::{AttributeType, Schema};

/// An attribute type together with its transfer options, e.g.
/// `userCertificate;binary` or `cn;lang-fr`.
///
/// Options are an unordered set of lowercase tags. Descriptions whose
/// syntax requires BER transfer always carry the `binary` option, whether
/// or not the source wrote it.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    attribute_type: Arc<AttributeType>,
    options: BTreeSet<String>,
}

impl AttributeDescription {
    /// Parses `type[;option]*` and resolves the type against the schema.
    pub fn parse(description: &str, schema: &Schema) -> Result<Self, String> {
        let mut parts = description.split(';');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(format!("attribute description '{description}' has an empty type"));
        }
        if !is_valid_type_name(name) {
            return Err(format!(
                "attribute description '{description}' has an invalid type name '{name}'"
            ));
        }

        let mut options = BTreeSet::new();
        for option in parts {
            let option = option.trim();
            if option.is_empty() {
                return Err(format!(
                    "attribute description '{description}' has an empty option"
                ));
            }
            options.insert(option.to_ascii_lowercase());
        }

        let attribute_type = schema.attribute_type(name);
        if attribute_type.syntax().is_ber_encoding_required() {
            options.insert("binary".to_string());
        }
        Ok(AttributeDescription { attribute_type, options })
    }

    /// Builds a description for a bare type with no options.
    pub fn of_type(attribute_type: Arc<AttributeType>) -> Self {
        let mut options = BTreeSet::new();
        if attribute_type.syntax().is_ber_encoding_required() {
            options.insert("binary".to_string());
        }
        AttributeDescription { attribute_type, options }
    }

    /// The resolved attribute type.
    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    /// The lowercase option tags.
    pub fn options(&self) -> &BTreeSet<String> {
        &self.options
    }

    /// Whether the description carries the given option tag.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(&option.to_ascii_lowercase())
    }

    /// Whether this description has any options.
    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    /// Whether two descriptions carry exactly the same option set.
    pub fn options_equal(&self, other: &AttributeDescription) -> bool {
        self.options == other.options
    }

    /// Whether two descriptions name the same type with the same options.
    pub fn matches(&self, other: &AttributeDescription) -> bool {
        self.attribute_type == other.attribute_type && self.options_equal(other)
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attribute_type.name())?;
        for option in &self.options {
            write!(f, ";{option}")?;
        }
        Ok(())
    }
}

fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// An immutable attribute: a description plus its values in source order.
#[derive(Debug, Clone)]
pub struct Attribute {
    description: AttributeDescription,
    values: Vec<Vec<u8>>,
}

impl Attribute {
    /// The attribute description.
    pub fn description(&self) -> &AttributeDescription {
        &self.description
    }

    /// The primary name of the attribute type.
    pub fn name(&self) -> &str {
        self.description.attribute_type().name()
    }

    /// The raw values, in the order they appeared.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// The number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the attribute has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the attribute already holds `value` (byte equality).
    pub fn contains(&self, value: &[u8]) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// The first value, if any.
    pub fn first_value(&self) -> Option<&[u8]> {
        self.values.first().map(Vec::as_slice)
    }
}

/// A mutable accumulator for one attribute while a record is being parsed.
///
/// Builders only live inside a single record parse; they are materialised
/// into immutable [`Attribute`]s when the record is emitted.
#[derive(Debug)]
pub struct AttributeBuilder {
    description: AttributeDescription,
    values: Vec<Vec<u8>>,
}

impl AttributeBuilder {
    /// A builder for the given description with no values yet.
    pub fn new(description: AttributeDescription) -> Self {
        AttributeBuilder { description, values: Vec::new() }
    }

    /// Seeds a builder from an existing attribute's values.
    pub fn from_attribute(attribute: &Attribute) -> Self {
        AttributeBuilder {
            description: attribute.description.clone(),
            values: attribute.values.clone(),
        }
    }

    /// The description this builder accumulates values for.
    pub fn description(&self) -> &AttributeDescription {
        &self.description
    }

    /// Adds a value. Returns `false` when an equal value is already
    /// present, leaving the builder unchanged.
    pub fn add(&mut self, value: Vec<u8>) -> bool {
        if self.values.iter().any(|v| *v == value) {
            return false;
        }
        self.values.push(value);
        true
    }

    /// The number of accumulated values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no values have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Materialises the accumulated values into an immutable attribute.
    pub fn into_attribute(self) -> Attribute {
        Attribute { description: self.description, values: self.values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_lowercased() {
        let schema = Schema::core();
        let desc = AttributeDescription::parse("cn;LANG-FR;x-local", &schema).unwrap();
        assert_eq!(desc.attribute_type().name(), "cn");
        assert!(desc.has_option("lang-fr"));
        assert!(desc.has_option("X-LOCAL"));
        assert_eq!(desc.to_string(), "cn;lang-fr;x-local");
    }

    #[test]
    fn binary_option_forced_for_ber_syntax() {
        let schema = Schema::core();
        let desc = AttributeDescription::parse("userCertificate", &schema).unwrap();
        assert!(desc.has_option("binary"));
    }

    #[test]
    fn rejects_malformed_descriptions() {
        let schema = Schema::core();
        assert!(AttributeDescription::parse("", &schema).is_err());
        assert!(AttributeDescription::parse(";binary", &schema).is_err());
        assert!(AttributeDescription::parse("cn;", &schema).is_err());
        assert!(AttributeDescription::parse("c n", &schema).is_err());
    }

    #[test]
    fn builder_reports_duplicates() {
        let schema = Schema::core();
        let desc = AttributeDescription::parse("cn", &schema).unwrap();
        let mut builder = AttributeBuilder::new(desc);
        assert!(builder.add(b"one".to_vec()));
        assert!(builder.add(b"two".to_vec()));
        assert!(!builder.add(b"one".to_vec()));
        let attribute = builder.into_attribute();
        assert_eq!(attribute.len(), 2);
        assert!(attribute.contains(b"one"));
    }

    #[test]
    fn option_sets_compare_unordered() {
        let schema = Schema::core();
        let a = AttributeDescription::parse("cn;a;b", &schema).unwrap();
        let b = AttributeDescription::parse("cn;b;a", &schema).unwrap();
        assert!(a.matches(&b));
        let c = AttributeDescription::parse("cn;a", &schema).unwrap();
        assert!(!a.matches(&c));
    }
}
