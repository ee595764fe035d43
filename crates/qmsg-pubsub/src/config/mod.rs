//! Messaging config loader (strict parsing).

pub mod schema;

use std::fs;

use qmsg_core::error::{QmsgError, Result};

pub use schema::{MessagingConfig, PubSubSection, RetrySection, TransportSettings};

pub fn load_from_file(path: &str) -> Result<MessagingConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| QmsgError::Configuration(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MessagingConfig> {
    let cfg: MessagingConfig = serde_yaml::from_str(s)
        .map_err(|e| QmsgError::Configuration(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
