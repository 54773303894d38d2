//! ---
//! keel_section: "01-core-functionality"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Shared primitives and utilities for the patch and lifecycle engines."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Total ordering over dot-separated version strings.
//!
//! Versions are compared segment by segment. Each segment is split into a
//! leading run of digits, compared numerically (without overflow, so
//! arbitrarily long numbers are fine), followed by a suffix compared
//! lexically. Missing trailing segments count as `0`, which makes `"1.2"` and
//! `"1.2.0"` equal. An absent or blank version normalises to `"0"`, the
//! minimum of the order.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The origin version every topic starts from.
pub const ORIGIN: &str = "0";

/// A normalised version string with a total order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Normalise `raw` into a version; blank input becomes `"0"`.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::origin()
        } else {
            Self(trimmed.to_owned())
        }
    }

    /// The `"0"` version.
    pub fn origin() -> Self {
        Self(ORIGIN.to_owned())
    }

    /// Normalise an optional version, treating `None` as the origin.
    pub fn normalize(raw: Option<&str>) -> Self {
        raw.map_or_else(Self::origin, Self::new)
    }

    /// Borrow the version as written (after trimming).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this version compares equal to `"0"`.
    pub fn is_origin(&self) -> bool {
        self.canonical().is_empty()
    }

    /// `self < other`.
    pub fn is_older_than(&self, other: &Version) -> bool {
        self < other
    }

    /// `self > other`.
    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }

    /// `self <= other`.
    pub fn is_older_or_equal(&self, other: &Version) -> bool {
        self <= other
    }

    /// `self >= other`.
    pub fn is_newer_or_equal(&self, other: &Version) -> bool {
        self >= other
    }

    fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.0.split('.').map(Segment::parse)
    }

    /// Segments with trailing zero segments removed; equal versions share it.
    fn canonical(&self) -> Vec<Segment<'_>> {
        let mut segments: Vec<Segment<'_>> = self.segments().collect();
        while segments.last() == Some(&Segment::ZERO) {
            segments.pop();
        }
        segments
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::origin()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.segments();
        let mut right = other.segments();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (l, r) => {
                    let ordering = l
                        .unwrap_or(Segment::ZERO)
                        .cmp(&r.unwrap_or(Segment::ZERO));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
        }
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&Version> for Version {
    fn from(value: &Version) -> Self {
        value.clone()
    }
}

impl From<Option<&str>> for Version {
    fn from(value: Option<&str>) -> Self {
        Self::normalize(value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Segment<'a> {
    /// Leading digits with leading zeros stripped; empty means zero.
    digits: &'a str,
    suffix: &'a str,
}

impl<'a> Segment<'a> {
    const ZERO: Segment<'static> = Segment {
        digits: "",
        suffix: "",
    };

    fn parse(raw: &'a str) -> Self {
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, suffix) = raw.split_at(split);
        Self {
            digits: digits.trim_start_matches('0'),
            suffix,
        }
    }
}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.digits
            .len()
            .cmp(&other.digits.len())
            .then_with(|| self.digits.cmp(other.digits))
            .then_with(|| self.suffix.cmp(other.suffix))
    }
}

/// Compare two raw version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    Version::new(a).cmp(&Version::new(b))
}

/// `a == b` under the version order.
pub fn equal(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Equal
}

/// `a < b`.
pub fn older(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Less
}

/// `a > b`.
pub fn newer(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Greater
}

/// `a <= b`.
pub fn older_or_equal(a: &str, b: &str) -> bool {
    compare(a, b) != Ordering::Greater
}

/// `a >= b`.
pub fn newer_or_equal(a: &str, b: &str) -> bool {
    compare(a, b) != Ordering::Less
}
