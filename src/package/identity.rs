use anyhow::Result;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::version::parse_version;

/// Case-insensitive package id.
///
/// The original spelling is kept for display; equality, hashing and ordering
/// use the lowercase form.
#[derive(Debug, Clone)]
pub struct PackageId {
    name: String,
    key: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.to_lowercase();
        Self { name, key }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The normalized (lowercase) form used for comparisons and directory names.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        PackageId::new(s)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        PackageId::new(s)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(PackageId::new(name))
    }
}

/// A specific version of a package (`id@version`).
///
/// Ordering is by id (case-insensitive) then version, and is the single
/// comparer used by every graph operation in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: PackageId,
    #[serde(deserialize_with = "super::version::deserialize_version")]
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(id: impl Into<PackageId>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

impl FromStr for PackageIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, version) = s
            .split_once('@')
            .ok_or_else(|| anyhow::anyhow!("Invalid package identity '{}'. Expected 'id@version'.", s))?;
        if id.is_empty() {
            anyhow::bail!("Invalid package identity '{}'. Package id is empty.", s);
        }
        Ok(PackageIdentity::new(id, parse_version(version)?))
    }
}

/// A package reference as typed by a user: an id with an optional version.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSpec {
    pub id: PackageId,
    pub version: Option<Version>,
}

impl FromStr for PackageSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some(_) => {
                let identity: PackageIdentity = s.parse()?;
                Ok(PackageSpec {
                    id: identity.id,
                    version: Some(identity.version),
                })
            }
            None if s.trim().is_empty() => anyhow::bail!("Package id is empty."),
            None => Ok(PackageSpec {
                id: PackageId::new(s.trim()),
                version: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_equality_ignores_case() {
        assert_eq!(PackageId::new("Json.Tools"), PackageId::new("json.tools"));
        let mut set = HashSet::new();
        set.insert(PackageId::new("Json.Tools"));
        assert!(set.contains(&PackageId::new("JSON.TOOLS")));
    }

    #[test]
    fn test_id_keeps_original_spelling() {
        let id = PackageId::new("Json.Tools");
        assert_eq!(id.to_string(), "Json.Tools");
        assert_eq!(id.key(), "json.tools");
    }

    #[test]
    fn test_identity_parse_and_display() {
        let identity: PackageIdentity = "Json.Tools@1.2".parse().unwrap();
        assert_eq!(identity.id, PackageId::new("json.tools"));
        assert_eq!(identity.version, Version::new(1, 2, 0));
        assert_eq!(identity.to_string(), "Json.Tools@1.2.0");
    }

    #[test]
    fn test_identity_parse_invalid() {
        assert!("no-version".parse::<PackageIdentity>().is_err());
        assert!("@1.0.0".parse::<PackageIdentity>().is_err());
        assert!("pkg@not.a.version".parse::<PackageIdentity>().is_err());
    }

    #[test]
    fn test_identity_ordering_by_id_then_version() {
        let mut ids: Vec<PackageIdentity> = ["b@1.0.0", "A@2.0.0", "a@1.0.0"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ids.sort();
        let shown: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(shown, vec!["a@1.0.0", "A@2.0.0", "b@1.0.0"]);
    }

    #[test]
    fn test_package_spec_parse() {
        let spec: PackageSpec = "tools".parse().unwrap();
        assert_eq!(spec.id, PackageId::new("tools"));
        assert!(spec.version.is_none());

        let spec: PackageSpec = "tools@v2.1.0".parse().unwrap();
        assert_eq!(spec.version, Some(Version::new(2, 1, 0)));

        assert!("".parse::<PackageSpec>().is_err());
    }
}
