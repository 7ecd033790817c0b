//! Tests for environment-driven configuration.
//!
//! Env mutation is process-global, so every phase that touches the
//! `WORKBRIDGE_*` variables lives in one sequential test.

use workbridge::config::Config;
use workbridge::error::Error;

#[test]
fn config_defaults_match_default_impl() {
    let config = Config::default();
    assert_eq!(config.workers, 4);
    assert_eq!(config.event_capacity, 1024);
    assert_eq!(config.log_level, "info");
}

#[test]
fn config_from_env_reads_overrides_and_validates() {
    // Clean slate: defaults.
    unsafe {
        std::env::remove_var("WORKBRIDGE_WORKERS");
        std::env::remove_var("WORKBRIDGE_EVENT_CAPACITY");
        std::env::remove_var("WORKBRIDGE_LOG");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.workers, 4);
    assert_eq!(config.event_capacity, 1024);
    assert_eq!(config.log_level, "info");

    // Overrides are picked up.
    unsafe {
        std::env::set_var("WORKBRIDGE_WORKERS", "2");
        std::env::set_var("WORKBRIDGE_EVENT_CAPACITY", "64");
        std::env::set_var("WORKBRIDGE_LOG", "debug");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.event_capacity, 64);
    assert_eq!(config.log_level, "debug");

    // Non-numeric worker counts are refused.
    unsafe {
        std::env::set_var("WORKBRIDGE_WORKERS", "two");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // Zero workers would strand every queued item.
    unsafe {
        std::env::set_var("WORKBRIDGE_WORKERS", "0");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // Zero event capacity is refused as well.
    unsafe {
        std::env::set_var("WORKBRIDGE_WORKERS", "2");
        std::env::set_var("WORKBRIDGE_EVENT_CAPACITY", "0");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // Clean up
    unsafe {
        std::env::remove_var("WORKBRIDGE_WORKERS");
        std::env::remove_var("WORKBRIDGE_EVENT_CAPACITY");
        std::env::remove_var("WORKBRIDGE_LOG");
    }
}
