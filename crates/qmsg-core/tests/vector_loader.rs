//! JSON test vector loader for header tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::fs;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HeaderVector {
    pub description: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

pub fn load(name: &str) -> HeaderVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
