//! Version parsing and dependency ranges.
//!
//! Versions are `semver::Version`, parsed leniently so that feed versions like
//! `1` or `v1.2` are accepted. Ranges use interval notation:
//!
//! - `1.0` means `>= 1.0.0`
//! - `[1.0]` means exactly `1.0.0`
//! - `[1.0,2.0)` / `(1.0,)` / `(,2.0]` are bounded intervals
//! - `*` or an empty string matches any version

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::PackageId;

/// Parse a version, padding missing minor/patch components.
pub fn parse_version(s: &str) -> Result<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    // Split off pre-release/build suffix before padding the numeric core.
    let split_at = s.find(['-', '+']).unwrap_or(s.len());
    let (core, suffix) = s.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("Invalid version '{}'", s);
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).with_context(|| format!("Invalid version '{}'", s))
}

/// Serde helper accepting the same lenient forms as [`parse_version`].
pub(crate) fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_version(&text).map_err(serde::de::Error::custom)
}

/// An acceptable interval of versions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub min_inclusive: bool,
    pub max: Option<Version>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Matches every version.
    pub fn any() -> Self {
        Self::default()
    }

    /// `>= version`
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// `[version]`
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            let ok = if self.min_inclusive {
                version >= min
            } else {
                version > min
            };
            if !ok {
                return false;
            }
        }
        if let Some(max) = &self.max {
            let ok = if self.max_inclusive {
                version <= max
            } else {
                version < max
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// The lowest version in `candidates` that satisfies the range.
    pub fn find_lowest<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.satisfies(v)).min()
    }

    /// The highest version in `candidates` that satisfies the range.
    pub fn find_highest<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.satisfies(v)).max()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), None) if self.min_inclusive => write!(f, ">= {}", min),
            (Some(min), Some(max)) if min == max && self.min_inclusive && self.max_inclusive => {
                write!(f, "[{}]", min)
            }
            (min, max) => {
                write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
                if let Some(min) = min {
                    write!(f, "{}", min)?;
                }
                write!(f, ", ")?;
                if let Some(max) = max {
                    write!(f, "{}", max)?;
                }
                write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(VersionRange::any());
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(VersionRange::at_least(parse_version(rest)?));
        }

        let first = s.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            return Ok(VersionRange::at_least(parse_version(s)?));
        }

        let last = s.chars().last().unwrap_or_default();
        if s.len() < 2 || (last != ']' && last != ')') {
            anyhow::bail!("Invalid version range '{}'", s);
        }
        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = &s[1..s.len() - 1];

        match inner.split_once(',') {
            None => {
                if !(min_inclusive && max_inclusive) {
                    anyhow::bail!("Invalid version range '{}': exact ranges use [x]", s);
                }
                Ok(VersionRange::exact(parse_version(inner)?))
            }
            Some((lo, hi)) => {
                let min = match lo.trim() {
                    "" => None,
                    v => Some(parse_version(v)?),
                };
                let max = match hi.trim() {
                    "" => None,
                    v => Some(parse_version(v)?),
                };
                if min.is_none() && max.is_none() {
                    anyhow::bail!("Invalid version range '{}': no bounds", s);
                }
                if let (Some(lo), Some(hi)) = (&min, &max)
                    && (lo > hi || (lo == hi && !(min_inclusive && max_inclusive)))
                {
                    anyhow::bail!("Invalid version range '{}': empty interval", s);
                }
                Ok(VersionRange {
                    min,
                    min_inclusive: min_inclusive && lo.trim() != "",
                    max,
                    max_inclusive: max_inclusive && hi.trim() != "",
                })
            }
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = match (&self.min, &self.max) {
            (Some(min), None) if self.min_inclusive => min.to_string(),
            _ => self.to_string().replace(' ', ""),
        };
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// "Package X requires some version of `id` within `range`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRange {
    pub id: PackageId,
    #[serde(default)]
    pub range: VersionRange,
}

impl DependencyRange {
    pub fn new(id: impl Into<PackageId>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }
}

impl fmt::Display for DependencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.range)
    }
}
