use crate::classify::{is_critical, operating_state};
use crate::model::{percent_change, percent_of, DailyOperatingData, LogRecord, OperatingState};
use crate::parse::TokenizedLog;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Inclusive time range records must fall in to be analyzed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl Window {
    /// The `days` days leading up to `now`. Clamped to the earliest representable time.
    pub fn trailing(now: NaiveDateTime, days: u32) -> Self {
        let from = now.checked_sub_signed(Duration::days(i64::from(days))).unwrap_or(NaiveDateTime::MIN);
        Self { from, to: now }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.from && ts <= self.to
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub operating: u64,
    pub teach: u64,
    pub error: u64,
    pub idle: u64,
}

impl StateCounts {
    fn add(&mut self, state: OperatingState) {
        match state {
            OperatingState::Operating => self.operating += 1,
            OperatingState::Teach => self.teach += 1,
            OperatingState::Error => self.error += 1,
            OperatingState::Idle => self.idle += 1,
        }
    }

    pub fn total(&self) -> u64 { self.operating + self.teach + self.error + self.idle }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStateSummary {
    pub total: u64,
    pub teach: u64,
    pub play: u64,
    pub error: u64,
    pub idle: u64,
    pub teach_percent: f64,
    pub play_percent: f64,
    pub error_percent: f64,
    pub idle_percent: f64,
    pub top_errors: Vec<(String, u64)>,
}

#[derive(Default)]
struct DayBucket {
    counts: StateCounts,
    critical: u64,
}

/// Windowed, per-day operating analysis of one controller's records.
pub struct Analyzer {
    pub window: Window,
    pub top_errors: usize,
    // Records without a usable date or outside the window
    pub excluded: u64,
    days: BTreeMap<NaiveDate, DayBucket>,
    totals: StateCounts,
    error_events: HashMap<String, u64>,
}

impl Analyzer {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            top_errors: 5,
            excluded: 0,
            days: BTreeMap::new(),
            totals: StateCounts::default(),
            error_events: HashMap::new(),
        }
    }

    pub fn with_top_errors(mut self, n: usize) -> Self {
        self.top_errors = n;
        self
    }

    pub fn consume_all<'a, I: IntoIterator<Item = &'a LogRecord>>(&mut self, records: I) {
        for r in records { self.consume_record(r); }
    }

    pub fn consume_record(&mut self, r: &LogRecord) {
        let Some(ts) = r.timestamp().filter(|ts| self.window.contains(*ts)) else {
            self.excluded += 1;
            return;
        };
        let state = operating_state(r);
        let day = self.days.entry(ts.date()).or_default();
        day.counts.add(state);
        if is_critical(r) { day.critical += 1; }
        self.totals.add(state);
        if state == OperatingState::Error {
            let name = r.event.as_deref().unwrap_or_default().trim().to_string();
            *self.error_events.entry(name).or_default() += 1;
        }
    }

    pub fn total(&self) -> u64 { self.totals.total() }

    /// One entry per calendar day with records, oldest first.
    pub fn daily(&self) -> Vec<DailyOperatingData> {
        self.days
            .iter()
            .map(|(date, b)| {
                let c = b.counts;
                let total = c.total();
                DailyOperatingData {
                    date: *date,
                    total,
                    operating: c.operating,
                    teach: c.teach,
                    error: c.error,
                    idle: c.idle,
                    operating_rate: percent_of(c.operating, total),
                    teach_rate: percent_of(c.teach, total),
                    error_rate: percent_of(c.error, total),
                    idle_rate: percent_of(c.idle, total),
                    critical_events: b.critical,
                }
            })
            .collect()
    }

    pub fn system_state(&self) -> SystemStateSummary {
        let t = self.totals;
        let total = t.total();
        SystemStateSummary {
            total,
            teach: t.teach,
            play: t.operating,
            error: t.error,
            idle: t.idle,
            teach_percent: percent_of(t.teach, total),
            play_percent: percent_of(t.operating, total),
            error_percent: percent_of(t.error, total),
            idle_percent: percent_of(t.idle, total),
            top_errors: top_counts(&self.error_events, self.top_errors),
        }
    }
}

/// Relative change of the operating rate from the first to the last day.
pub fn performance_trend(daily: &[DailyOperatingData]) -> f64 {
    match (daily.first(), daily.last()) {
        (Some(first), Some(last)) => percent_change(first.operating_rate, last.operating_rate),
        _ => 0.0,
    }
}

/// Sort by count desc, then key asc, and keep the first `limit`.
pub fn top_counts(counts: &HashMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut v: Vec<(String, u64)> = counts.iter().map(|(k, n)| (k.clone(), *n)).collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(limit);
    v
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticalExcerpt {
    pub index: u64,
    pub date: Option<String>,
    pub event: String,
    pub detail: Option<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct LogFileLimits {
    pub top_event_types: usize,
    pub critical_excerpts: usize,
}

impl Default for LogFileLimits {
    fn default() -> Self { Self { top_event_types: 10, critical_excerpts: 20 } }
}

/// Whole-file overview of a tokenized log, independent of any window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFileAnalysis {
    pub total_entries: u64,
    pub truncated: bool,
    pub undated_entries: u64,
    pub first_entry: Option<String>,
    pub last_entry: Option<String>,
    pub event_types: Vec<(String, u64)>,
    pub critical_events: u64,
    pub critical_excerpts: Vec<CriticalExcerpt>,
}

impl LogFileAnalysis {
    pub fn from_log(log: &TokenizedLog, limits: LogFileLimits) -> Self {
        let mut first: Option<NaiveDateTime> = None;
        let mut last: Option<NaiveDateTime> = None;
        let mut undated = 0;
        let mut types: HashMap<String, u64> = HashMap::new();
        let mut critical: Vec<&LogRecord> = Vec::new();

        for r in &log.records {
            match r.timestamp() {
                Some(ts) => {
                    first = Some(first.map_or(ts, |cur| cur.min(ts)));
                    last = Some(last.map_or(ts, |cur| cur.max(ts)));
                }
                None => undated += 1,
            }
            if let Some(ev) = r.event.as_deref() {
                *types.entry(ev.trim().to_string()).or_default() += 1;
            }
            if is_critical(r) { critical.push(r); }
        }

        let critical_events = critical.len() as u64;
        critical.sort_by(|a, b| (b.timestamp(), b.index).cmp(&(a.timestamp(), a.index)));
        let critical_excerpts = critical
            .into_iter()
            .take(limits.critical_excerpts)
            .map(|r| CriticalExcerpt {
                index: r.index,
                date: r.date.clone(),
                event: r.event.clone().unwrap_or_default(),
                detail: excerpt_detail(r),
            })
            .collect();

        let fmt = |d: NaiveDateTime| d.format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            total_entries: log.records.len() as u64,
            truncated: log.truncated,
            undated_entries: undated,
            first_entry: first.map(fmt),
            last_entry: last.map(fmt),
            event_types: top_counts(&types, limits.top_event_types),
            critical_events,
            critical_excerpts,
        }
    }
}

// First line after the DATE/EVENT/LOGIN NAME header
fn excerpt_detail(r: &LogRecord) -> Option<String> {
    r.raw_data
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| {
            let key = l.split(':').next().unwrap_or_default().trim().to_ascii_uppercase();
            !matches!(key.as_str(), "DATE" | "EVENT" | "LOGIN NAME")
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tokenize;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn log_text(entries: &[(u64, &str, &str, &str)]) -> String {
        entries
            .iter()
            .map(|(i, date, event, mode)| {
                format!("///INDEX {i}\nDATE : {date}\nEVENT : {event}\nMODE : {mode}\n")
            })
            .collect()
    }

    #[test]
    fn window_drops_old_and_undated_records() {
        let text = log_text(&[
            (1, "2024/05/01 08:00:00", "PLAY START", "PLAY"),
            (2, "2024/05/09 08:00:00", "PLAY START", "PLAY"),
            (3, "not a date", "PLAY START", "PLAY"),
        ]);
        let log = tokenize(&text);
        let mut an = Analyzer::new(Window::trailing(at("2024-05-10 00:00:00"), 7));
        an.consume_all(&log.records);
        assert_eq!(an.total(), 1);
        assert_eq!(an.excluded, 2);
    }

    #[test]
    fn huge_window_clamps_instead_of_overflowing() {
        let w = Window::trailing(at("2024-05-10 00:00:00"), u32::MAX);
        assert_eq!(w.from, NaiveDateTime::MIN);
        assert!(w.contains(at("1970-01-01 00:00:00")));

        let text = log_text(&[(1, "1999/01/01 08:00:00", "PLAY START", "PLAY")]);
        let mut an = Analyzer::new(w);
        an.consume_all(&tokenize(&text).records);
        assert_eq!(an.total(), 1);
        assert_eq!(an.excluded, 0);
    }

    #[test]
    fn daily_rates_sum_to_hundred_and_trend_matches() {
        let text = log_text(&[
            // day one: 1 operating, 1 teach, 1 error, 1 idle
            (1, "2024/05/08 08:00:00", "CYCLE START", "PLAY"),
            (2, "2024/05/08 09:00:00", "JOB EDIT", "TEACH"),
            (3, "2024/05/08 10:00:00", "SERVO FAULT", "PLAY"),
            (4, "2024/05/08 11:00:00", "", "PLAY"),
            // day two: 3 operating, 1 teach
            (5, "2024/05/09 08:00:00", "CYCLE START", "PLAY"),
            (6, "2024/05/09 09:00:00", "PLAY", "PLAY"),
            (7, "2024/05/09 10:00:00", "AUTO RUN", "PLAY"),
            (8, "2024/05/09 11:00:00", "JOB EDIT", "TEACH"),
        ]);
        let log = tokenize(&text);
        let mut an = Analyzer::new(Window::trailing(at("2024-05-10 00:00:00"), 7));
        an.consume_all(&log.records);
        let daily = an.daily();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date.to_string(), "2024-05-08");
        assert_eq!(daily[0].critical_events, 1);
        for d in &daily {
            let sum = d.operating_rate + d.teach_rate + d.error_rate + d.idle_rate;
            assert!((sum - 100.0).abs() < 1e-9);
        }
        assert_eq!(daily[0].operating_rate, 25.0);
        assert_eq!(daily[1].operating_rate, 75.0);
        assert_eq!(performance_trend(&daily), (75.0 - 25.0) / 25.0 * 100.0);
    }

    #[test]
    fn trend_is_zero_without_base() {
        assert_eq!(performance_trend(&[]), 0.0);
        let text = log_text(&[
            (1, "2024/05/08 08:00:00", "JOB EDIT", "TEACH"),
            (2, "2024/05/09 08:00:00", "CYCLE START", "PLAY"),
        ]);
        let log = tokenize(&text);
        let mut an = Analyzer::new(Window::trailing(at("2024-05-10 00:00:00"), 7));
        an.consume_all(&log.records);
        assert_eq!(performance_trend(&an.daily()), 0.0);
    }

    #[test]
    fn system_state_ranks_errors() {
        let text = log_text(&[
            (1, "2024/05/09 08:00:00", "SERVO ALARM", "PLAY"),
            (2, "2024/05/09 08:01:00", "SERVO ALARM", "PLAY"),
            (3, "2024/05/09 08:02:00", "ENCODER ERROR", "PLAY"),
            (4, "2024/05/09 08:03:00", "AIR PRESSURE FAULT", "PLAY"),
            (5, "2024/05/09 08:04:00", "CYCLE START", "PLAY"),
        ]);
        let log = tokenize(&text);
        let mut an = Analyzer::new(Window::trailing(at("2024-05-10 00:00:00"), 7)).with_top_errors(2);
        an.consume_all(&log.records);
        let s = an.system_state();
        assert_eq!(s.total, 5);
        assert_eq!(s.error, 4);
        assert_eq!(s.play_percent, 20.0);
        assert_eq!(
            s.top_errors,
            vec![("SERVO ALARM".to_string(), 2), ("AIR PRESSURE FAULT".to_string(), 1)]
        );
    }

    #[test]
    fn file_analysis_counts_and_excerpts() {
        let text = "///INDEX 1\nDATE : 2024/05/01 08:00:00\nEVENT : COLLISION DETECT\nAXIS : U\n\
                    ///INDEX 2\nEVENT : PLAY\n\
                    ///INDEX 3\nDATE : 2024/05/03 08:00:00\nEVENT : PLAY\n";
        let log = tokenize(text);
        let a = LogFileAnalysis::from_log(&log, LogFileLimits::default());
        assert_eq!(a.total_entries, 3);
        assert_eq!(a.undated_entries, 1);
        assert_eq!(a.first_entry.as_deref(), Some("2024-05-01 08:00:00"));
        assert_eq!(a.last_entry.as_deref(), Some("2024-05-03 08:00:00"));
        assert_eq!(a.event_types[0], ("PLAY".to_string(), 2));
        assert_eq!(a.critical_events, 1);
        assert_eq!(a.critical_excerpts[0].detail.as_deref(), Some("AXIS : U"));
    }
}
