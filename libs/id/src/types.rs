//! Identity type definitions for stored objects.

use crate::IdError;

/// Maximum length of an object name or namespace.
pub const MAX_NAME_LENGTH: usize = 253;

// =============================================================================
// UID
// =============================================================================

/// System-generated unique identifier of a stored object.
///
/// Two objects with the same key but different UIDs are different
/// incarnations: an owner reference only matches the incarnation it was
/// written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(crate::Ulid);

impl Uid {
    /// The prefix of the canonical string form.
    pub const PREFIX: &'static str = "uid";

    /// Creates a new UID with a fresh ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(crate::Ulid::new())
    }

    /// Creates a UID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: crate::Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> crate::Ulid {
        self.0
    }

    /// Parses a UID from its `uid_{ulid}` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((prefix, ulid_str)) = s.split_once('_') else {
            return Err(IdError::MissingSeparator);
        };

        if prefix != Self::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        let ulid = ulid_str
            .parse::<crate::Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;

        Ok(Self(ulid))
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl std::str::FromStr for Uid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Uid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Uid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Object Key
// =============================================================================

/// Namespaced identity of an object: `namespace/name`.
///
/// This is the unit of deduplication in the work queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Creates a key without validating the parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a key, validating both parts against the naming rules.
    pub fn try_new(namespace: &str, name: &str) -> Result<Self, IdError> {
        validate_name(namespace)?;
        validate_name(name)?;
        Ok(Self::new(namespace, name))
    }

    /// Parses a key from `namespace/name`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((namespace, name)) = s.split_once('/') else {
            return Err(IdError::InvalidKey(s.to_string()));
        };
        if name.contains('/') {
            return Err(IdError::InvalidKey(s.to_string()));
        }
        Self::try_new(namespace, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a key for another object in the same namespace.
    #[must_use]
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validates a name or namespace: lowercase alphanumerics, `-` and `.`,
/// starting and ending with an alphanumeric character.
pub fn validate_name(name: &str) -> Result<(), IdError> {
    if name.is_empty() {
        return Err(IdError::Empty);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(IdError::InvalidName {
            name: name.to_string(),
            reason: "longer than 253 characters",
        });
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
    if !name.chars().all(valid_char) {
        return Err(IdError::InvalidName {
            name: name.to_string(),
            reason: "only lowercase alphanumerics, '-' and '.' are allowed",
        });
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(IdError::InvalidName {
            name: name.to_string(),
            reason: "must start and end with an alphanumeric character",
        });
    }
    Ok(())
}

// =============================================================================
// Resource Version
// =============================================================================

/// Optimistic-concurrency token of a stored object.
///
/// Serialized as a decimal string. Callers must treat it as opaque and only
/// hand it back unchanged on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// Creates a resource version from a raw counter value.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ResourceVersion {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| IdError::InvalidResourceVersion(s.to_string()))
    }
}

impl serde::Serialize for ResourceVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uid_prefix() {
        let uid = Uid::new();
        assert!(uid.to_string().starts_with("uid_"));
    }

    #[test]
    fn test_uid_invalid_prefix() {
        let result: Result<Uid, _> = "app_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidPrefix { .. }));
    }

    #[test]
    fn test_uid_missing_separator() {
        let result: Result<Uid, _> = "uid01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), IdError::MissingSeparator));
    }

    #[test]
    fn test_uid_invalid_ulid() {
        let result: Result<Uid, _> = "uid_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_uid_json_roundtrip() {
        let uid = Uid::new();
        let json = serde_json::to_string(&uid).unwrap();
        let parsed: Uid = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_object_key_parse() {
        let key: ObjectKey = "landscape/ingress-stack".parse().unwrap();
        assert_eq!(key.namespace(), "landscape");
        assert_eq!(key.name(), "ingress-stack");
        assert_eq!(key.to_string(), "landscape/ingress-stack");
    }

    #[test]
    fn test_object_key_rejects_malformed() {
        assert!(matches!(ObjectKey::parse(""), Err(IdError::Empty)));
        assert!(matches!(
            ObjectKey::parse("no-separator"),
            Err(IdError::InvalidKey(_))
        ));
        assert!(matches!(
            ObjectKey::parse("a/b/c"),
            Err(IdError::InvalidKey(_))
        ));
        assert!(matches!(
            ObjectKey::parse("Upper/name"),
            Err(IdError::InvalidName { .. })
        ));
        assert!(matches!(
            ObjectKey::parse("ns/-leading"),
            Err(IdError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_object_key_sibling() {
        let key = ObjectKey::new("landscape", "a");
        assert_eq!(key.sibling("b"), ObjectKey::new("landscape", "b"));
    }

    #[test]
    fn test_resource_version_serializes_as_string() {
        let rv = ResourceVersion::new(42);
        assert_eq!(serde_json::to_string(&rv).unwrap(), "\"42\"");
        let parsed: ResourceVersion = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(parsed, rv);
        assert!("abc".parse::<ResourceVersion>().is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_keys_roundtrip(ns in "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?", name in "[a-z0-9]([a-z0-9.-]{0,40}[a-z0-9])?") {
            let key = ObjectKey::try_new(&ns, &name).unwrap();
            let parsed = ObjectKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(key, parsed);
        }
    }
}
