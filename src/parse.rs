use crate::model::LogRecord;
use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on records kept from a single file.
pub const MAX_RECORDS: usize = 1000;

static INDEX_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*///INDEX\s+(\d+)").expect("index marker regex"));

/// Records of one log file, in file order.
#[derive(Clone, Debug, Default)]
pub struct TokenizedLog {
    pub records: Vec<LogRecord>,
    /// Set when the file held more records than the tokenizer's cap.
    pub truncated: bool,
}

impl TokenizedLog {
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
    pub fn len(&self) -> usize { self.records.len() }
}

/// Splits `LOGDATA.DAT` text into `///INDEX` delimited records.
pub struct RecordTokenizer {
    cap: usize,
}

impl Default for RecordTokenizer {
    fn default() -> Self { Self { cap: MAX_RECORDS } }
}

impl RecordTokenizer {
    pub fn with_cap(cap: usize) -> Self { Self { cap } }

    pub fn tokenize(&self, text: &str) -> TokenizedLog {
        let mut out = TokenizedLog::default();
        let mut current: Option<RecordBuilder> = None;

        for line in text.lines() {
            if let Some(index) = marker_index(line) {
                if let Some(b) = current.take() { out.records.push(b.finish()); }
                if out.records.len() >= self.cap {
                    out.truncated = true;
                    break;
                }
                current = Some(RecordBuilder::new(index, line));
                continue;
            }
            // Anything before the first marker belongs to no record
            if let Some(b) = current.as_mut() { b.push_line(line); }
        }
        if let Some(b) = current.take() { out.records.push(b.finish()); }

        if out.truncated {
            tracing::warn!("Truncating log at {} records", self.cap);
        }
        out
    }
}

/// Tokenize with the default record cap.
pub fn tokenize(text: &str) -> TokenizedLog {
    RecordTokenizer::default().tokenize(text)
}

/// Index number of a `///INDEX n` line.
pub fn marker_index(line: &str) -> Option<u64> {
    INDEX_MARKER.captures(line).and_then(|c| c[1].parse().ok())
}

/// Split at the first colon, both halves trimmed.
pub fn split_field(line: &str) -> Option<(&str, &str)> {
    line.split_once(':').map(|(k, v)| (k.trim(), v.trim()))
}

struct RecordBuilder {
    record: LogRecord,
    raw: Vec<String>,
}

impl RecordBuilder {
    fn new(index: u64, marker: &str) -> Self {
        Self {
            record: LogRecord { index, ..Default::default() },
            raw: vec![marker.to_string()],
        }
    }

    fn push_line(&mut self, line: &str) {
        self.raw.push(line.to_string());
        let Some((key, value)) = split_field(line) else { return };
        if key.is_empty() { return; }
        let value = (!value.is_empty()).then(|| value.to_string());
        match key.to_ascii_uppercase().as_str() {
            "DATE" => self.record.date = value,
            "EVENT" => self.record.event = value,
            "LOGIN NAME" => self.record.login_name = value,
            _ => { self.record.fields.insert(key.to_string(), value.unwrap_or_default()); }
        }
    }

    fn finish(mut self) -> LogRecord {
        self.record.raw_data = self.raw.join("\n");
        self.record
    }
}

/// Which tier of a two-tier lookup produced a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier { Field, Raw }

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLookup {
    pub value: String,
    pub tier: Tier,
}

/// Structured field first, then the first capture of `fallback` over the raw text.
pub fn lookup(record: &LogRecord, key: &str, fallback: &Regex) -> Option<FieldLookup> {
    if let Some(v) = record.field(key) {
        return Some(FieldLookup { value: v.trim().to_string(), tier: Tier::Field });
    }
    fallback
        .captures(&record.raw_data)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|v| !v.is_empty())
        .map(|v| FieldLookup { value: v.to_string(), tier: Tier::Raw })
}
