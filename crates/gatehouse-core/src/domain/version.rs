//! Semantic versions for release records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::GateError;

/// MAJOR.MINOR.PATCH. Ordering is numeric, component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Which component of the version to increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    #[default]
    Patch,
    Minor,
    Major,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `X.Y.Z`, tolerating a leading `v`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.strip_prefix('v').unwrap_or(input);
        let mut parts = input.split('.');
        let major = parts.next()?.parse::<u64>().ok()?;
        let minor = parts.next()?.parse::<u64>().ok()?;
        let patch = parts.next()?.parse::<u64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// Next version for `bump`; lower components reset to zero.
    pub fn bump(self, bump: VersionBump) -> Self {
        match bump {
            VersionBump::Patch => Self::new(self.major, self.minor, self.patch + 1),
            VersionBump::Minor => Self::new(self.major, self.minor + 1, 0),
            VersionBump::Major => Self::new(self.major + 1, 0, 0),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).ok_or_else(|| GateError::InvalidVersion(s.to_string()))
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid version '{}'", raw)))
    }
}

impl FromStr for VersionBump {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(VersionBump::Patch),
            "minor" => Ok(VersionBump::Minor),
            "major" => Ok(VersionBump::Major),
            other => Err(GateError::InvalidVersion(format!("unknown bump '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v = Version::parse("v1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
        assert!(Version::parse("1.2").is_none());
        assert!(Version::parse("1.2.3.4").is_none());
        assert!(Version::parse("1.x.3").is_none());
    }

    #[test]
    fn test_bump_resets_lower_components() {
        let v = Version::new(1, 4, 7);
        assert_eq!(v.bump(VersionBump::Patch), Version::new(1, 4, 8));
        assert_eq!(v.bump(VersionBump::Minor), Version::new(1, 5, 0));
        assert_eq!(v.bump(VersionBump::Major), Version::new(2, 0, 0));
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Version::new(0, 3, 1)).unwrap();
        assert_eq!(json, "\"0.3.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::new(0, 3, 1));
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }

    #[test]
    fn test_bump_from_str() {
        assert_eq!("MINOR".parse::<VersionBump>().unwrap(), VersionBump::Minor);
        assert!("huge".parse::<VersionBump>().is_err());
    }
}
