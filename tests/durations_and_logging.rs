// tests/durations_and_logging.rs

use std::time::Duration;

use tracing::Level;
use workflow_runner::cli::LogLevel;
use workflow_runner::logging::{parse_level_str, resolve_level};
use workflow_runner::types::{HumanDuration, parse_duration};

#[test]
fn parses_every_supported_unit() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
    assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
    assert_eq!(parse_duration(" 24h "), Ok(Duration::from_secs(86_400)));
    assert_eq!(parse_duration("7d"), Ok(Duration::from_secs(7 * 86_400)));
}

#[test]
fn rejects_malformed_durations() {
    for input in ["", "10", "h", "3 weeks", "-5s", "1.5h"] {
        assert!(parse_duration(input).is_err(), "{input:?} should not parse");
    }
}

#[test]
fn oversized_durations_are_rejected() {
    let err = parse_duration("999999999999999999d").unwrap_err();
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration("18446744073709551615m").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s"),
        Ok(Duration::from_secs(u64::MAX))
    );
}

#[test]
fn displays_in_the_largest_whole_unit() {
    assert_eq!(HumanDuration(Duration::from_secs(86_400)).to_string(), "1d");
    assert_eq!(HumanDuration(Duration::from_secs(7_200)).to_string(), "2h");
    assert_eq!(HumanDuration(Duration::from_secs(90)).to_string(), "90s");
    assert_eq!(HumanDuration(Duration::from_millis(1_500)).to_string(), "1500ms");
}

#[test]
fn cli_level_wins_over_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warning")), Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

#[test]
fn level_strings_are_case_insensitive() {
    assert_eq!(parse_level_str("TRACE"), Some(Level::TRACE));
    assert_eq!(parse_level_str(" Info "), Some(Level::INFO));
    assert_eq!(parse_level_str("verbose"), None);
}
