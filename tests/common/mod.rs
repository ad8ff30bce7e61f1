//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use chrono::NaiveDateTime;

pub const FIXTURE_LOG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/LOGDATA.DAT");

/// Helper function to read a fixture, panicking with a clear message if not found.
pub fn read_fixture(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read fixture '{}': {}", path, e))
}

pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap_or_else(|e| panic!("bad time {s}: {e}"))
}

/// One `///INDEX` block with the given header and extra lines.
pub fn record(index: u64, date: Option<&str>, event: &str, extra: &[&str]) -> String {
    let mut s = format!("///INDEX {index}\n");
    if let Some(d) = date {
        s.push_str(&format!("DATE      : {d}\n"));
    }
    s.push_str(&format!("EVENT     : {event}\n"));
    for line in extra {
        s.push_str(line);
        s.push('\n');
    }
    s
}

pub fn org_abso(index: u64, date: &str, s: i64, l: i64) -> String {
    record(
        index,
        Some(date),
        "ORG ABSO",
        &["GROUP     : R1", "CURR VALUE", &format!("R1 :S {s}"), &format!("        L {l}")],
    )
}
