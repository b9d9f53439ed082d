//! Configuration loading

use std::io::Write;
use tickwatch::bar::Interval;
use tickwatch::config::{Config, StorageBackend};

#[test]
fn test_example_config_matches_defaults() {
    let example: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    example.validate().unwrap();

    let defaults = Config::default();
    assert_eq!(
        toml::to_string(&example).unwrap(),
        toml::to_string(&defaults).unwrap()
    );
}

#[test]
fn test_load_partial_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [watchlist]
        max_watchlist_size = 5

        [provider]
        interval = "5m"

        [storage]
        backend = "memory"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.watchlist.max_watchlist_size, 5);
    assert_eq!(config.provider.interval, Interval::FiveMinutes);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.live.batch_size, 50);
}

#[test]
fn test_load_rejects_unordered_boundaries() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [session]
        market_open = "17:00"
        "#
    )
    .unwrap();

    assert!(Config::load(file.path()).is_err());
}
