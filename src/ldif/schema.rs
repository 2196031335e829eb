//! Directory schema handle: attribute types, object classes and syntaxes.
//!
//! The reader never consults a global schema; it is handed a [`Schema`]
//! at construction. Attribute types and object classes are interned inside
//! the schema and shared by identity (`Arc`), so two records mentioning
//! `cn` resolve to the same definition. Names that are not registered are
//! tolerated: lookups intern a placeholder definition on the fly and keep
//! parsing, which matches how a permissive import treats unknown types.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::dn::Dn;
use super::entry::Entry;

/// How syntax-violating attribute values are treated during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxPolicy {
    /// Accept values without checking them against their syntax.
    #[default]
    Accept,
    /// Check values and log a warning on violation, but keep the record.
    Warn,
    /// Check values and reject the whole record on violation.
    Reject,
}

/// An LDAP attribute syntax.
///
/// Only the behaviour the reader needs is modelled: whether values of the
/// syntax must be transferred BER-encoded (the `binary` option), and a
/// validity check used by the [`SyntaxPolicy`] enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// UTF-8 text (`1.3.6.1.4.1.1466.115.121.1.15`).
    DirectoryString,
    /// ASCII-only text (`1.3.6.1.4.1.1466.115.121.1.26`).
    Ia5String,
    /// An optionally-signed decimal integer (`1.3.6.1.4.1.1466.115.121.1.27`).
    Integer,
    /// `TRUE` or `FALSE` (`1.3.6.1.4.1.1466.115.121.1.7`).
    Boolean,
    /// `YYYYMMDDHHmmss[.f]Z` style timestamps (`1.3.6.1.4.1.1466.115.121.1.24`).
    GeneralizedTime,
    /// A distinguished name (`1.3.6.1.4.1.1466.115.121.1.12`).
    DistinguishedName,
    /// Arbitrary bytes (`1.3.6.1.4.1.1466.115.121.1.40`).
    OctetString,
    /// X.509 certificates (`1.3.6.1.4.1.1466.115.121.1.8`); BER-encoded.
    Certificate,
}

impl Syntax {
    /// Whether values of this syntax must carry the `binary` transfer option.
    pub fn is_ber_encoding_required(&self) -> bool {
        matches!(self, Syntax::Certificate)
    }

    /// Checks a raw value against this syntax.
    pub fn value_is_acceptable(&self, value: &[u8]) -> Result<(), String> {
        match self {
            Syntax::DirectoryString => match std::str::from_utf8(value) {
                Ok(_) => Ok(()),
                Err(_) => Err("value is not valid UTF-8".to_string()),
            },
            Syntax::Ia5String => {
                if value.iter().all(u8::is_ascii) {
                    Ok(())
                } else {
                    Err("value contains non-ASCII bytes".to_string())
                }
            }
            Syntax::Integer => {
                let digits = match value {
                    [b'-', rest @ ..] => rest,
                    other => other,
                };
                if !digits.is_empty() && digits.iter().all(u8::is_ascii_digit) {
                    Ok(())
                } else {
                    Err("value is not a decimal integer".to_string())
                }
            }
            Syntax::Boolean => {
                if value == b"TRUE" || value == b"FALSE" {
                    Ok(())
                } else {
                    Err("boolean value must be 'TRUE' or 'FALSE'".to_string())
                }
            }
            Syntax::GeneralizedTime => check_generalized_time(value),
            Syntax::DistinguishedName => {
                let text = std::str::from_utf8(value)
                    .map_err(|_| "DN value is not valid UTF-8".to_string())?;
                Dn::parse(text).map(|_| ())
            }
            Syntax::OctetString | Syntax::Certificate => Ok(()),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Syntax::DirectoryString => "Directory String",
            Syntax::Ia5String => "IA5 String",
            Syntax::Integer => "Integer",
            Syntax::Boolean => "Boolean",
            Syntax::GeneralizedTime => "Generalized Time",
            Syntax::DistinguishedName => "DN",
            Syntax::OctetString => "Octet String",
            Syntax::Certificate => "Certificate",
        };
        write!(f, "{name}")
    }
}

fn check_generalized_time(value: &[u8]) -> Result<(), String> {
    // Minimal shape check: at least YYYYMMDDHH, optional fraction, then
    // 'Z' or a +-HHMM offset.
    let mut rest = value;
    let mut digits = 0;
    while let [b, tail @ ..] = rest {
        if b.is_ascii_digit() {
            digits += 1;
            rest = tail;
        } else {
            break;
        }
    }
    if digits < 10 {
        return Err("generalized time is too short".to_string());
    }
    if let [b'.', tail @ ..] = rest {
        let mut fraction = 0;
        rest = tail;
        while let [b, tail @ ..] = rest {
            if b.is_ascii_digit() {
                fraction += 1;
                rest = tail;
            } else {
                break;
            }
        }
        if fraction == 0 {
            return Err("generalized time has an empty fraction".to_string());
        }
    }
    match rest {
        [b'Z'] => Ok(()),
        [b'+' | b'-', a, b, c, d] if [a, b, c, d].iter().all(|x| x.is_ascii_digit()) => Ok(()),
        _ => Err("generalized time must end with 'Z' or a UTC offset".to_string()),
    }
}

/// A schema definition for one attribute type.
///
/// Definitions are interned by the owning [`Schema`]; identity (equality,
/// hashing) is keyed on the lowercase primary name.
#[derive(Debug)]
pub struct AttributeType {
    oid: String,
    name: String,
    key: String,
    syntax: Syntax,
    single_value: bool,
    operational: bool,
}

impl AttributeType {
    /// Creates a definition. `name` keeps its case for display; identity
    /// uses the lowercased form.
    pub fn new(
        oid: impl Into<String>,
        name: impl Into<String>,
        syntax: Syntax,
        single_value: bool,
        operational: bool,
    ) -> Self {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        AttributeType { oid: oid.into(), name, key, syntax, single_value, operational }
    }

    /// The numeric OID of this type.
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// The primary name of this type as registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowercase identity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The declared syntax.
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Whether the type admits at most one value.
    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    /// Whether the type is server-maintained.
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Whether this is the `objectClass` attribute type.
    pub fn is_object_class(&self) -> bool {
        self.key == "objectclass"
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AttributeType {}

impl std::hash::Hash for AttributeType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Structural role of an object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

/// A schema definition for one object class.
#[derive(Debug)]
pub struct ObjectClass {
    oid: String,
    name: String,
    key: String,
    kind: ObjectClassKind,
    superior: Option<String>,
    required: Vec<String>,
    optional: Vec<String>,
    placeholder: bool,
}

impl ObjectClass {
    /// Creates a definition. Superior and attribute names are stored as
    /// lowercase keys.
    pub fn new(
        oid: impl Into<String>,
        name: impl Into<String>,
        kind: ObjectClassKind,
        superior: Option<&str>,
        required: &[&str],
        optional: &[&str],
    ) -> Self {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        ObjectClass {
            oid: oid.into(),
            name,
            key,
            kind,
            superior: superior.map(str::to_ascii_lowercase),
            required: required.iter().map(|s| s.to_ascii_lowercase()).collect(),
            optional: optional.iter().map(|s| s.to_ascii_lowercase()).collect(),
            placeholder: false,
        }
    }

    fn placeholder(name: &str) -> Self {
        let name = name.to_string();
        let key = name.to_ascii_lowercase();
        ObjectClass {
            oid: format!("{key}-oid"),
            name,
            key,
            kind: ObjectClassKind::Structural,
            superior: None,
            required: Vec::new(),
            optional: Vec::new(),
            placeholder: true,
        }
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowercase identity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ObjectClassKind {
        self.kind
    }

    /// The lowercase key of the superior class, if any.
    pub fn superior(&self) -> Option<&str> {
        self.superior.as_deref()
    }

    /// Lowercase keys of the attribute types the class requires.
    pub fn required_attributes(&self) -> &[String] {
        &self.required
    }

    /// Lowercase keys of the attribute types the class allows.
    pub fn optional_attributes(&self) -> &[String] {
        &self.optional
    }

    /// Whether this definition was interned for an unknown class name.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl PartialEq for ObjectClass {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ObjectClass {}

/// The directory's type system, as consumed by the reader.
///
/// Lookups by unknown names intern tolerant placeholder definitions so that
/// permissive imports keep working; strictness comes from the import
/// configuration, not from the schema handle.
#[derive(Debug, Default)]
pub struct Schema {
    attribute_types: RwLock<HashMap<String, Arc<AttributeType>>>,
    object_classes: RwLock<HashMap<String, Arc<ObjectClass>>>,
}

impl Schema {
    /// An empty schema; every lookup interns a placeholder.
    pub fn new() -> Self {
        Schema::default()
    }

    /// A schema preloaded with the common core attribute types and object
    /// classes used by directory entries.
    pub fn core() -> Self {
        let schema = Schema::new();
        schema.register_core_attribute_types();
        schema.register_core_object_classes();
        schema
    }

    /// Registers an attribute type, keyed by its name and OID.
    pub fn register_attribute_type(&self, attribute_type: AttributeType) -> Arc<AttributeType> {
        let arc = Arc::new(attribute_type);
        let mut map = self.attribute_types.write().expect("schema lock poisoned");
        map.insert(arc.key.clone(), Arc::clone(&arc));
        map.insert(arc.oid.clone(), Arc::clone(&arc));
        arc
    }

    /// Registers an object class, keyed by its name and OID.
    pub fn register_object_class(&self, object_class: ObjectClass) -> Arc<ObjectClass> {
        let arc = Arc::new(object_class);
        let mut map = self.object_classes.write().expect("schema lock poisoned");
        map.insert(arc.key.clone(), Arc::clone(&arc));
        map.insert(arc.oid.clone(), Arc::clone(&arc));
        arc
    }

    /// Resolves an attribute type by name or OID, interning a tolerant
    /// placeholder (directory-string syntax, multi-valued, user attribute)
    /// when the name is unknown.
    pub fn attribute_type(&self, name: &str) -> Arc<AttributeType> {
        let key = name.trim().to_ascii_lowercase();
        {
            let map = self.attribute_types.read().expect("schema lock poisoned");
            if let Some(found) = map.get(&key) {
                return Arc::clone(found);
            }
        }
        let placeholder = AttributeType::new(
            format!("{key}-oid"),
            name.trim(),
            Syntax::DirectoryString,
            false,
            false,
        );
        let arc = Arc::new(placeholder);
        let mut map = self.attribute_types.write().expect("schema lock poisoned");
        // Another thread may have interned the same name in the meantime.
        Arc::clone(map.entry(key).or_insert(arc))
    }

    /// Looks up a registered attribute type without interning.
    pub fn find_attribute_type(&self, name: &str) -> Option<Arc<AttributeType>> {
        let key = name.trim().to_ascii_lowercase();
        let map = self.attribute_types.read().expect("schema lock poisoned");
        map.get(&key).map(Arc::clone)
    }

    /// Resolves an object class by name or OID, interning a placeholder
    /// kept under the given name when unknown.
    pub fn object_class(&self, name: &str) -> Arc<ObjectClass> {
        let key = name.trim().to_ascii_lowercase();
        {
            let map = self.object_classes.read().expect("schema lock poisoned");
            if let Some(found) = map.get(&key) {
                return Arc::clone(found);
            }
        }
        let arc = Arc::new(ObjectClass::placeholder(name.trim()));
        let mut map = self.object_classes.write().expect("schema lock poisoned");
        Arc::clone(map.entry(key).or_insert(arc))
    }

    /// Looks up a registered object class without interning.
    pub fn find_object_class(&self, name: &str) -> Option<Arc<ObjectClass>> {
        let key = name.trim().to_ascii_lowercase();
        let map = self.object_classes.read().expect("schema lock poisoned");
        map.get(&key).map(Arc::clone)
    }

    /// The chain of superior classes above `object_class`, nearest first.
    /// Unknown superiors terminate the chain; cycles are not followed twice.
    pub fn superior_chain(&self, object_class: &ObjectClass) -> Vec<Arc<ObjectClass>> {
        let mut chain = Vec::new();
        let mut seen = vec![object_class.key.clone()];
        let mut current = object_class.superior.clone();
        while let Some(name) = current {
            if seen.contains(&name) {
                break;
            }
            match self.find_object_class(&name) {
                Some(sup) => {
                    seen.push(sup.key.clone());
                    current = sup.superior.clone();
                    chain.push(sup);
                }
                None => break,
            }
        }
        chain
    }

    /// Checks an assembled entry against the schema: every attribute type
    /// required by the entry's object classes (and their superiors) must be
    /// present. Placeholder classes impose no requirements.
    pub fn check_entry_conformance(&self, entry: &Entry) -> Result<(), String> {
        for (object_class, _) in entry.object_classes() {
            let mut classes: Vec<Arc<ObjectClass>> = vec![Arc::clone(object_class)];
            classes.extend(self.superior_chain(object_class));
            for class in &classes {
                for required in class.required_attributes() {
                    // The objectClass attribute itself lives in the
                    // object-class map, not in the attribute buckets.
                    if required == "objectclass" {
                        continue;
                    }
                    if !entry.has_attribute_key(required) {
                        return Err(format!(
                            "missing attribute '{}' required by object class '{}'",
                            required,
                            class.name()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn register_core_attribute_types(&self) {
        use Syntax::*;
        let defs: &[(&str, &str, Syntax, bool, bool)] = &[
            ("2.5.4.0", "objectClass", DirectoryString, false, false),
            ("2.5.4.3", "cn", DirectoryString, false, false),
            ("2.5.4.4", "sn", DirectoryString, false, false),
            ("2.5.4.10", "o", DirectoryString, false, false),
            ("2.5.4.11", "ou", DirectoryString, false, false),
            ("2.5.4.13", "description", DirectoryString, false, false),
            ("2.5.4.20", "telephoneNumber", DirectoryString, false, false),
            ("2.5.4.31", "member", DistinguishedName, false, false),
            ("2.5.4.34", "seeAlso", DistinguishedName, false, false),
            ("2.5.4.35", "userPassword", OctetString, false, false),
            ("2.5.4.36", "userCertificate", Certificate, false, false),
            ("2.5.4.50", "uniqueMember", DistinguishedName, false, false),
            ("0.9.2342.19200300.100.1.1", "uid", DirectoryString, false, false),
            ("0.9.2342.19200300.100.1.3", "mail", Ia5String, false, false),
            ("0.9.2342.19200300.100.1.25", "dc", Ia5String, true, false),
            ("1.3.6.1.1.1.1.0", "uidNumber", Integer, true, false),
            ("1.3.6.1.1.1.1.1", "gidNumber", Integer, true, false),
            ("2.16.840.1.113730.3.1.241", "displayName", DirectoryString, true, false),
            ("2.16.840.1.113730.3.1.3", "employeeNumber", DirectoryString, true, false),
            // Operational attributes maintained by the server.
            ("2.5.18.1", "createTimestamp", GeneralizedTime, true, true),
            ("2.5.18.2", "modifyTimestamp", GeneralizedTime, true, true),
            ("2.5.18.3", "creatorsName", DistinguishedName, true, true),
            ("2.5.18.4", "modifiersName", DistinguishedName, true, true),
            ("1.3.6.1.1.16.4", "entryUUID", DirectoryString, true, true),
        ];
        for (oid, name, syntax, single, operational) in defs {
            self.register_attribute_type(AttributeType::new(
                *oid,
                *name,
                *syntax,
                *single,
                *operational,
            ));
        }
    }

    fn register_core_object_classes(&self) {
        use ObjectClassKind::*;
        self.register_object_class(ObjectClass::new(
            "2.5.6.0",
            "top",
            Abstract,
            None,
            &["objectClass"],
            &[],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.6",
            "person",
            Structural,
            Some("top"),
            &["sn", "cn"],
            &["userPassword", "telephoneNumber", "seeAlso", "description"],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.7",
            "organizationalPerson",
            Structural,
            Some("person"),
            &[],
            &["ou", "telephoneNumber"],
        ));
        self.register_object_class(ObjectClass::new(
            "2.16.840.1.113730.3.2.2",
            "inetOrgPerson",
            Structural,
            Some("organizationalPerson"),
            &[],
            &["uid", "mail", "displayName", "employeeNumber", "userCertificate"],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.4",
            "organization",
            Structural,
            Some("top"),
            &["o"],
            &["description"],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.5",
            "organizationalUnit",
            Structural,
            Some("top"),
            &["ou"],
            &["description", "telephoneNumber"],
        ));
        self.register_object_class(ObjectClass::new(
            "0.9.2342.19200300.100.4.13",
            "domain",
            Structural,
            Some("top"),
            &["dc"],
            &["description", "o"],
        ));
        self.register_object_class(ObjectClass::new(
            "1.3.6.1.4.1.1466.344",
            "dcObject",
            Auxiliary,
            Some("top"),
            &["dc"],
            &[],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.9",
            "groupOfNames",
            Structural,
            Some("top"),
            &["cn"],
            &["member", "description", "ou", "o"],
        ));
        self.register_object_class(ObjectClass::new(
            "2.5.6.14",
            "device",
            Structural,
            Some("top"),
            &["cn"],
            &["description", "ou", "o", "seeAlso"],
        ));
        self.register_object_class(ObjectClass::new(
            "1.3.6.1.4.1.1466.101.120.111",
            "extensibleObject",
            Auxiliary,
            Some("top"),
            &[],
            &[],
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_unknown_attribute_types_once() {
        let schema = Schema::new();
        let a = schema.attribute_type("favouriteDrink");
        let b = schema.attribute_type("FAVOURITEDRINK");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.syntax(), Syntax::DirectoryString);
        assert!(!a.is_single_value());
    }

    #[test]
    fn core_schema_flags() {
        let schema = Schema::core();
        assert!(schema.attribute_type("objectClass").is_object_class());
        assert!(schema.attribute_type("dc").is_single_value());
        assert!(schema.attribute_type("createTimestamp").is_operational());
        assert!(schema
            .attribute_type("userCertificate")
            .syntax()
            .is_ber_encoding_required());
    }

    #[test]
    fn lookup_by_oid() {
        let schema = Schema::core();
        let by_oid = schema.attribute_type("2.5.4.3");
        assert_eq!(by_oid.name(), "cn");
    }

    #[test]
    fn superior_chain_walks_to_top() {
        let schema = Schema::core();
        let inet = schema.object_class("inetOrgPerson");
        let chain = schema.superior_chain(&inet);
        let names: Vec<&str> = chain.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["organizationalPerson", "person", "top"]);
    }

    #[test]
    fn unknown_object_class_is_kept_by_name() {
        let schema = Schema::core();
        let oc = schema.object_class("frobnicator");
        assert!(oc.is_placeholder());
        assert_eq!(oc.name(), "frobnicator");
        assert!(schema.superior_chain(&oc).is_empty());
    }

    #[test]
    fn syntax_checks() {
        assert!(Syntax::Boolean.value_is_acceptable(b"TRUE").is_ok());
        assert!(Syntax::Boolean.value_is_acceptable(b"maybe").is_err());
        assert!(Syntax::Integer.value_is_acceptable(b"-42").is_ok());
        assert!(Syntax::Integer.value_is_acceptable(b"4 2").is_err());
        assert!(Syntax::Ia5String.value_is_acceptable("héllo".as_bytes()).is_err());
        assert!(Syntax::GeneralizedTime.value_is_acceptable(b"20130516200520Z").is_ok());
        assert!(Syntax::GeneralizedTime.value_is_acceptable(b"not a time").is_err());
        assert!(Syntax::DistinguishedName.value_is_acceptable(b"dc=example").is_ok());
    }
}
