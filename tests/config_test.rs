use std::num::NonZeroUsize;
use std::time::Duration;

use workq::YieldPolicy;
use workq::config::Config;

// Environment variables are process-global, so every env-driven case lives in
// this one test.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("WORKQ_YIELD");
        std::env::remove_var("WORKQ_JOURNAL_CAPACITY");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.yield_policy, YieldPolicy::EveryNode);
    assert_eq!(config.log_level, "info");

    unsafe {
        std::env::set_var("WORKQ_YIELD", "batch:8");
        std::env::set_var("WORKQ_JOURNAL_CAPACITY", "256");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "workq=debug");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.yield_policy,
        YieldPolicy::Batch(NonZeroUsize::new(8).unwrap())
    );
    assert_eq!(config.journal_capacity, 256);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "workq=debug");

    unsafe {
        std::env::set_var("WORKQ_YIELD", "whenever");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("WORKQ_YIELD", "never");
        std::env::set_var("WORKQ_JOURNAL_CAPACITY", "lots");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("WORKQ_YIELD");
        std::env::remove_var("WORKQ_JOURNAL_CAPACITY");
        std::env::remove_var("OTEL_ENDPOINT");
        std::env::remove_var("LOG_LEVEL");
    }
}

#[test]
fn config_from_toml_fills_defaults() {
    let config = Config::from_toml_str(
        r#"
        yield_policy = "slice:4"
        journal_capacity = 100
        "#,
    )
    .unwrap();

    assert_eq!(
        config.yield_policy,
        YieldPolicy::TimeSlice(Duration::from_millis(4))
    );
    assert_eq!(config.journal_capacity, 100);
    assert_eq!(config.otel_endpoint, None);
    assert_eq!(config.log_level, "info");
}

#[test]
fn config_from_toml_rejects_bad_values() {
    assert!(Config::from_toml_str(r#"yield_policy = "batch:0""#).is_err());
    assert!(Config::from_toml_str(r#"journal_capacity = -1"#).is_err());
    assert!(Config::from_toml_str(r#"unknown_key = true"#).is_err());
}

#[test]
fn config_load_reports_missing_file() {
    let err = Config::load(std::path::Path::new("/nonexistent/workq.toml")).unwrap_err();
    assert!(matches!(err, workq::Error::Config(_)), "{err:?}");
}
