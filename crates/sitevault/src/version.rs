//! Date-stamped version numbers such as `2023042400` or `2023042400.01`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MAX_FRACTION_DIGITS: usize = 6;

/// A version number with an integer build part and an optional decimal
/// fraction. Ordering is numeric, so `2023042400.1 == 2023042400.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    build: u64,
    /// Fraction scaled to six decimal digits.
    fraction: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{0}'")]
pub struct ParseVersionError(pub String);

impl Version {
    pub const fn new(build: u64) -> Self {
        Self { build, fraction: 0 }
    }

    pub fn build(&self) -> u64 {
        self.build
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseVersionError(s.to_string());
        let (build_part, fraction_part) = match trimmed.split_once('.') {
            Some((b, f)) => (b, Some(f)),
            None => (trimmed, None),
        };
        if build_part.is_empty() || !build_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let build = build_part.parse::<u64>().map_err(|_| err())?;

        let fraction = match fraction_part {
            None => 0,
            Some(f) => {
                if f.is_empty()
                    || f.len() > MAX_FRACTION_DIGITS
                    || !f.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(err());
                }
                let padded = format!("{:0<width$}", f, width = MAX_FRACTION_DIGITS);
                padded.parse::<u32>().map_err(|_| err())?
            }
        };

        Ok(Self { build, fraction })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fraction == 0 {
            return write!(f, "{}", self.build);
        }
        let digits = format!("{:06}", self.fraction);
        write!(f, "{}.{}", self.build, digits.trim_end_matches('0'))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.build
            .cmp(&other.build)
            .then(self.fraction.cmp(&other.fraction))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct VersionVisitor;

impl Visitor<'_> for VersionVisitor {
    type Value = Version;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a version number or numeric string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Version, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Version, E> {
        Ok(Version::new(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Version, E> {
        u64::try_from(v)
            .map(Version::new)
            .map_err(|_| E::custom(format!("negative version {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Version, E> {
        // Floats lose digits past the sixth decimal; round-trip via text.
        let text = format!("{:.6}", v);
        let text = text.trim_end_matches('0').trim_end_matches('.');
        text.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VersionVisitor)
    }
}
