//! EUI-48 MAC address field.
//!
//! Accepted spellings: `78:F8:82:B2:E5:5A`, `78-f8-82-b2-e5-5a`,
//! `78f8.82b2.e55a` and `78f882b2e55a`. Output is always the lowercase
//! colon-separated form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("\"{0}\" cannot be formatted as MAC.")]
pub struct MacParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).ok_or_else(|| MacParseError(s.to_owned()))
    }
}

fn parse(s: &str) -> Option<MacAddress> {
    let mut octets = [0u8; 6];

    if let Some(sep) = [':', '-'].into_iter().find(|c| s.contains(*c)) {
        let groups: Vec<&str> = s.split(sep).collect();
        if groups.len() != 6 {
            return None;
        }
        for (slot, group) in octets.iter_mut().zip(groups) {
            if group.is_empty() || group.len() > 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            *slot = u8::from_str_radix(group, 16).ok()?;
        }
        return Some(MacAddress(octets));
    }

    let digits: String = if s.contains('.') {
        let groups: Vec<&str> = s.split('.').collect();
        if groups.len() != 3 || groups.iter().any(|g| g.len() != 4) {
            return None;
        }
        groups.concat()
    } else {
        s.to_owned()
    };

    if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    for (i, slot) in octets.iter_mut().enumerate() {
        *slot = u8::from_str_radix(digits.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(MacAddress(octets))
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
