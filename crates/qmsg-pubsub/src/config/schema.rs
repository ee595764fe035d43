use serde::Deserialize;
use qmsg_core::error::{QmsgError, Result};

const DEFAULT_ENDPOINT: &str = "pubsub.googleapis.com:443";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    pub version: u32,

    pub pubsub: PubSubSection,

    #[serde(default)]
    pub retry: RetrySection,
}

impl MessagingConfig {
    /// Programmatic config with default retry settings.
    pub fn new(
        topic: impl Into<String>,
        subscription: impl Into<String>,
        dead_letter_topic: impl Into<String>,
    ) -> Self {
        Self {
            version: 1,
            pubsub: PubSubSection {
                topic: Some(topic.into()),
                subscription: Some(subscription.into()),
                dead_letter_topic: Some(dead_letter_topic.into()),
                project_id: None,
                emulator_host: None,
            },
            retry: RetrySection::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(QmsgError::Configuration(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.pubsub.validate()?;
        self.retry.validate()?;

        Ok(())
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            project_id: self.pubsub.project_id.clone(),
            emulator_host: self.pubsub.emulator_host.clone(),
        }
    }

    /// Fully qualified primary topic name.
    pub fn topic_path(&self) -> String {
        self.transport_settings().topic_path(required(&self.pubsub.topic))
    }

    pub fn subscription_path(&self) -> String {
        self.transport_settings()
            .subscription_path(required(&self.pubsub.subscription))
    }

    pub fn dead_letter_topic_path(&self) -> String {
        self.transport_settings()
            .topic_path(required(&self.pubsub.dead_letter_topic))
    }
}

// Only called after `validate`, which rejects missing names.
fn required(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubSection {
    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub dead_letter_topic: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub emulator_host: Option<String>,
}

impl PubSubSection {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("pubsub.topic", &self.topic),
            ("pubsub.subscription", &self.subscription),
            ("pubsub.dead_letter_topic", &self.dead_letter_topic),
        ] {
            match value.as_deref() {
                Some(v) if !v.trim().is_empty() => {}
                _ => return Err(QmsgError::Configuration(format!("{key} must be set"))),
            }
        }
        if matches!(self.project_id.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(QmsgError::Configuration(
                "pubsub.project_id must not be empty when given".into(),
            ));
        }
        Ok(())
    }
}

/// Attempt budget and delay schedule. Delays grow from `backoff_ms` by
/// `multiplier` up to `max_backoff_ms`; `backoff_ms: 0` retries immediately.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(QmsgError::Configuration(
                "retry.max_attempts must be between 1 and 10".into(),
            ));
        }
        if self.backoff_ms > 60_000 || self.max_backoff_ms > 60_000 {
            return Err(QmsgError::Configuration(
                "retry.backoff_ms and retry.max_backoff_ms must be at most 60000".into(),
            ));
        }
        if self.max_backoff_ms < self.backoff_ms {
            return Err(QmsgError::Configuration(
                "retry.max_backoff_ms must not be below retry.backoff_ms".into(),
            ));
        }
        if !(1.0..=10.0).contains(&self.multiplier) {
            return Err(QmsgError::Configuration(
                "retry.multiplier must be between 1.0 and 10.0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Connection details handed to a transport constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSettings {
    pub project_id: Option<String>,
    pub emulator_host: Option<String>,
}

impl TransportSettings {
    pub fn endpoint(&self) -> &str {
        self.emulator_host.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn uses_emulator(&self) -> bool {
        self.emulator_host.is_some()
    }

    pub fn topic_path(&self, name: &str) -> String {
        self.resource_path("topics", name)
    }

    pub fn subscription_path(&self, name: &str) -> String {
        self.resource_path("subscriptions", name)
    }

    fn resource_path(&self, collection: &str, name: &str) -> String {
        match &self.project_id {
            Some(project) => format!("projects/{project}/{collection}/{name}"),
            None => name.to_owned(),
        }
    }
}
