#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use qmsg_pubsub::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
  dead_leter_topic: "typo" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIGURATION_ERROR");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.topic_path(), "orders");
    assert_eq!(cfg.transport_settings().endpoint(), "pubsub.googleapis.com:443");
}

#[test]
fn missing_dead_letter_topic_is_named() {
    let bad = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("pubsub.dead_letter_topic"));
}

#[test]
fn unsupported_version() {
    let bad = r#"
version: 2
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIGURATION_ERROR");
}

#[test]
fn retry_bounds_are_checked() {
    let bad = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
retry:
  max_attempts: 0
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn backoff_schedule_is_checked() {
    let base = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
retry:
"#;
    let ok = format!("{base}  backoff_ms: 100\n  max_backoff_ms: 400\n  multiplier: 1.5\n");
    let cfg = config::load_from_str(&ok).expect("must parse");
    assert_eq!(cfg.retry.max_backoff_ms, 400);

    for bad in [
        "  backoff_ms: 500\n  max_backoff_ms: 100\n",
        "  multiplier: 0.5\n",
        "  max_backoff_ms: 60001\n",
    ] {
        let err = config::load_from_str(&format!("{base}{bad}")).expect_err("must fail");
        assert_eq!(err.kind().as_str(), "CONFIGURATION_ERROR", "retry section: {bad}");
    }
}

#[test]
fn project_and_emulator_are_explicit_settings() {
    let ok = r#"
version: 1
pubsub:
  topic: "orders"
  subscription: "orders-worker"
  dead_letter_topic: "orders-dlq"
  project_id: "acme"
  emulator_host: "localhost:8085"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let settings = cfg.transport_settings();
    assert_eq!(settings.endpoint(), "localhost:8085");
    assert!(settings.uses_emulator());
    assert_eq!(cfg.topic_path(), "projects/acme/topics/orders");
    assert_eq!(cfg.subscription_path(), "projects/acme/subscriptions/orders-worker");
    assert_eq!(cfg.dead_letter_topic_path(), "projects/acme/topics/orders-dlq");
}

#[test]
fn missing_file_is_a_configuration_error() {
    let err = config::load_from_file("does/not/exist.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIGURATION_ERROR");
}
