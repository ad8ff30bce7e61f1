use crate::analyze::{performance_trend, Analyzer, LogFileAnalysis, LogFileLimits, SystemStateSummary, Window};
use crate::compare::{analyze_changes, ChangeAnalysis};
use crate::config::{AnalysisSettings, Settings};
use crate::error::{ReportError, SourceError};
use crate::model::{percent_change, DailyOperatingData};
use crate::parse::tokenize;
use crate::source::{LogProvider, Query, Row, RowExt, TabularSource, ALARM_TIME};
use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const UNKNOWN: &str = "Unknown";

fn fmt_time(t: NaiveDateTime) -> String {
    t.format(TIME_FMT).to_string()
}

// ---- per-log analysis ----

/// Everything derived from one controller log file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysis {
    pub file: LogFileAnalysis,
    pub window_days: u32,
    pub excluded_from_window: u64,
    pub daily: Vec<DailyOperatingData>,
    pub performance_trend: f64,
    pub system_state: SystemStateSummary,
    pub changes: ChangeAnalysis,
}

impl LogAnalysis {
    pub fn from_text(text: &str, settings: &AnalysisSettings, now: NaiveDateTime) -> Self {
        let log = tokenize(text);
        let file = LogFileAnalysis::from_log(
            &log,
            LogFileLimits {
                top_event_types: settings.top_event_types,
                critical_excerpts: settings.critical_excerpts,
            },
        );
        let mut analyzer =
            Analyzer::new(Window::trailing(now, settings.window_days)).with_top_errors(settings.top_errors);
        analyzer.consume_all(&log.records);
        let daily = analyzer.daily();
        Self {
            file,
            window_days: settings.window_days,
            excluded_from_window: analyzer.excluded,
            performance_trend: performance_trend(&daily),
            daily,
            system_state: analyzer.system_state(),
            changes: analyze_changes(&log.records),
        }
    }
}

// ---- report sections ----

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub model: String,
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSection {
    pub total: usize,
    pub controllers: Vec<ControllerInfo>,
    pub status_counts: Vec<(String, u64)>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerRate {
    pub controller_id: String,
    pub name: String,
    pub average_rate: f64,
    pub samples: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSection {
    pub current_average: f64,
    pub previous_average: f64,
    pub percent_diff: f64,
    pub current_samples: u64,
    pub previous_samples: u64,
    pub per_controller: Vec<ControllerRate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmCodeCount {
    pub code: String,
    pub name: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityDistribution {
    pub major: u64,
    pub minor: u64,
    pub other: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmEntry {
    pub controller_id: String,
    pub controller_name: String,
    pub code: String,
    pub name: String,
    pub priority: String,
    pub occurred_at: Option<String>,
    pub resolved_at: Option<String>,
    pub active: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmSection {
    pub window_hours: u32,
    pub total_in_window: u64,
    pub total_in_period: u64,
    pub active: u64,
    /// Every alarm code of the period, most frequent first
    pub codes: Vec<AlarmCodeCount>,
    pub severity: SeverityDistribution,
    pub recent: Vec<AlarmEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub controller_id: String,
    pub name: String,
    pub last_backup: Option<String>,
    pub days_since: Option<i64>,
    pub missing: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSection {
    pub stale_after_days: i64,
    pub missing_count: u64,
    pub controllers: Vec<BackupStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerProduction {
    pub controller_id: String,
    pub name: String,
    pub today: f64,
    pub yesterday: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionSection {
    pub today: f64,
    pub yesterday: f64,
    pub diff: f64,
    pub percent_diff: f64,
    pub per_controller: Vec<ControllerProduction>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceEntry {
    pub controller_id: String,
    pub name: String,
    pub performed_at: Option<String>,
    pub description: String,
    pub servo_hours: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceProjection {
    pub controller_id: String,
    pub name: String,
    pub servo_hours: f64,
    pub hours_until_next: f64,
    pub days_until_next: f64,
    pub projected_date: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSection {
    pub interval_hours: f64,
    pub history: Vec<MaintenanceEntry>,
    pub projections: Vec<MaintenanceProjection>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerLogReport {
    pub controller_id: String,
    pub name: String,
    pub ip: String,
    pub has_data: bool,
    pub analysis: Option<LogAnalysis>,
}

/// The nested structure handed to a [`ReportSink`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: String,
    pub period_days: u32,
    pub controllers: ControllerSection,
    pub performance: PerformanceSection,
    pub alarms: AlarmSection,
    pub backups: BackupSection,
    pub production: ProductionSection,
    pub maintenance: MaintenanceSection,
    pub logs: Vec<ControllerLogReport>,
    /// Sections emitted as placeholders because their source failed
    pub failed_sections: Vec<String>,
}

// ---- assembly ----

pub struct ReportContext<'a> {
    pub tables: &'a dyn TabularSource,
    pub logs: &'a dyn LogProvider,
    pub settings: &'a Settings,
    pub now: NaiveDateTime,
}

/// Build the full report. Only a missing controller roster is fatal.
pub fn assemble(ctx: &ReportContext<'_>) -> Result<Report, ReportError> {
    let roster = ctx.tables.fetch(&Query::Controllers).map_err(ReportError::Roster)?;
    let controllers: Vec<ControllerInfo> = roster.iter().map(controller_info).collect();
    if controllers.is_empty() {
        return Err(ReportError::NoControllers);
    }
    let names: HashMap<&str, &str> = controllers.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    tracing::info!("Assembling report for {} controllers", controllers.len());

    let mut failed = Vec::new();
    let performance = section("performance", &mut failed, || performance_section(ctx, &controllers));
    let alarms = section("alarms", &mut failed, || alarm_section(ctx, &names));
    let backups = section("backups", &mut failed, || backup_section(ctx, &controllers));
    let production = section("production", &mut failed, || production_section(ctx, &controllers));
    let maintenance = section("maintenance", &mut failed, || maintenance_section(ctx, &roster, &names));
    let logs = controllers
        .iter()
        .map(|c| controller_log_report(ctx, c, &mut failed))
        .collect();

    Ok(Report {
        generated_at: fmt_time(ctx.now),
        period_days: ctx.settings.report.period_days,
        controllers: ControllerSection {
            total: controllers.len(),
            status_counts: status_counts(&controllers),
            controllers,
        },
        performance,
        alarms,
        backups,
        production,
        maintenance,
        logs,
        failed_sections: failed,
    })
}

fn section<T: Default>(
    name: &str,
    failed: &mut Vec<String>,
    build: impl FnOnce() -> Result<T, SourceError>,
) -> T {
    build().unwrap_or_else(|e| {
        tracing::warn!("Report section {name} unavailable: {e}");
        failed.push(name.to_string());
        T::default()
    })
}

fn controller_id(row: &Row) -> String {
    row.text("controller_id").unwrap_or_default()
}

fn controller_info(row: &Row) -> ControllerInfo {
    ControllerInfo {
        id: row.text("id").unwrap_or_default(),
        name: row.text_or("name", UNKNOWN),
        ip: row.text("ip").unwrap_or_default(),
        model: row.text_or("model", UNKNOWN),
        status: row.text_or("status", UNKNOWN),
    }
}

fn status_counts(controllers: &[ControllerInfo]) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for c in controllers {
        *counts.entry(c.status.clone()).or_default() += 1;
    }
    let mut v: Vec<(String, u64)> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

/// `now - by`, or a section error when that leaves the calendar.
fn before(now: NaiveDateTime, by: Duration) -> Result<NaiveDateTime, SourceError> {
    now.checked_sub_signed(by)
        .ok_or_else(|| SourceError::OutOfRange(format!("{by} before {}", fmt_time(now))))
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

fn performance_section(ctx: &ReportContext<'_>, controllers: &[ControllerInfo]) -> Result<PerformanceSection, SourceError> {
    let period = Duration::days(i64::from(ctx.settings.report.period_days));
    let (start, prev_start) = (before(ctx.now, period)?, before(ctx.now, period * 2)?);
    let current = ctx.tables.fetch(&Query::Utilization { since: start, until: ctx.now })?;
    let previous = ctx.tables.fetch(&Query::Utilization { since: prev_start, until: start })?;

    let rates = |rows: &[Row]| rows.iter().map(|r| r.number("operating_rate")).collect::<Vec<_>>();
    let (cur, prev) = (rates(&current), rates(&previous));
    let (current_average, previous_average) = (average(&cur), average(&prev));

    let per_controller = controllers
        .iter()
        .map(|c| {
            let samples: Vec<f64> = current
                .iter()
                .filter(|r| controller_id(r) == c.id)
                .map(|r| r.number("operating_rate"))
                .collect();
            ControllerRate {
                controller_id: c.id.clone(),
                name: c.name.clone(),
                average_rate: average(&samples),
                samples: samples.len() as u64,
            }
        })
        .collect();

    Ok(PerformanceSection {
        current_average,
        previous_average,
        percent_diff: percent_change(previous_average, current_average),
        current_samples: cur.len() as u64,
        previous_samples: prev.len() as u64,
        per_controller,
    })
}

fn severity_of(row: &Row) -> &'static str {
    let p = row.text("priority").or_else(|| row.text("type")).unwrap_or_default().to_uppercase();
    if p.contains("MAJOR") {
        "major"
    } else if p.contains("MINOR") {
        "minor"
    } else {
        "other"
    }
}

fn alarm_section(ctx: &ReportContext<'_>, names: &HashMap<&str, &str>) -> Result<AlarmSection, SourceError> {
    let rs = &ctx.settings.report;
    let in_window = ctx.tables.fetch(&Query::Alarms {
        since: before(ctx.now, Duration::hours(i64::from(rs.alarm_window_hours)))?,
        until: ctx.now,
    })?;
    let mut period = ctx.tables.fetch(&Query::Alarms {
        since: before(ctx.now, Duration::days(i64::from(rs.period_days)))?,
        until: ctx.now,
    })?;
    period.sort_by_key(|r| std::cmp::Reverse(r.timestamp(ALARM_TIME)));

    let mut codes: HashMap<String, AlarmCodeCount> = HashMap::new();
    let mut severity = SeverityDistribution::default();
    let mut recent = Vec::with_capacity(period.len());
    for r in &period {
        let code = r.text_or("code", UNKNOWN);
        let name = r.text("name").or_else(|| r.text("message")).unwrap_or_default();
        let entry = codes.entry(code.clone()).or_insert_with(|| AlarmCodeCount {
            code: code.clone(),
            name: name.clone(),
            count: 0,
        });
        entry.count += 1;
        match severity_of(r) {
            "major" => severity.major += 1,
            "minor" => severity.minor += 1,
            _ => severity.other += 1,
        }
        let cid = controller_id(r);
        recent.push(AlarmEntry {
            controller_name: names.get(cid.as_str()).copied().unwrap_or(UNKNOWN).to_string(),
            controller_id: cid,
            code,
            name,
            priority: r.text_or("priority", UNKNOWN),
            occurred_at: r.timestamp(ALARM_TIME).map(fmt_time),
            resolved_at: r.timestamp("resolved_at").map(fmt_time),
            active: r.is_null("resolved_at"),
        });
    }

    let mut codes: Vec<AlarmCodeCount> = codes.into_values().collect();
    codes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));

    Ok(AlarmSection {
        window_hours: rs.alarm_window_hours,
        total_in_window: in_window.len() as u64,
        total_in_period: period.len() as u64,
        active: recent.iter().filter(|a| a.active).count() as u64,
        codes,
        severity,
        recent,
    })
}

fn backup_section(ctx: &ReportContext<'_>, controllers: &[ControllerInfo]) -> Result<BackupSection, SourceError> {
    let rows = ctx.tables.fetch(&Query::Backups)?;
    let stale = ctx.settings.report.backup_stale_days;
    let mut latest: HashMap<String, NaiveDateTime> = HashMap::new();
    for r in &rows {
        let Some(t) = r.timestamp("created_at") else { continue };
        latest
            .entry(controller_id(r))
            .and_modify(|cur| *cur = (*cur).max(t))
            .or_insert(t);
    }

    let statuses: Vec<BackupStatus> = controllers
        .iter()
        .map(|c| {
            let last = latest.get(&c.id).copied();
            let days_since = last.map(|t| (ctx.now - t).num_days());
            BackupStatus {
                controller_id: c.id.clone(),
                name: c.name.clone(),
                last_backup: last.map(fmt_time),
                days_since,
                missing: days_since.map_or(true, |d| d > stale),
            }
        })
        .collect();

    Ok(BackupSection {
        stale_after_days: stale,
        missing_count: statuses.iter().filter(|s| s.missing).count() as u64,
        controllers: statuses,
    })
}

fn production_section(ctx: &ReportContext<'_>, controllers: &[ControllerInfo]) -> Result<ProductionSection, SourceError> {
    let today_day = ctx.now.date();
    let today_rows = ctx.tables.fetch(&Query::Production { day: today_day })?;
    let yesterday_day = today_day
        .pred_opt()
        .ok_or_else(|| SourceError::OutOfRange(format!("day before {today_day}")))?;
    let yesterday_rows = ctx.tables.fetch(&Query::Production { day: yesterday_day })?;

    let sum_for = |rows: &[Row], id: Option<&str>| -> f64 {
        rows.iter()
            .filter(|r| id.map_or(true, |id| controller_id(r) == id))
            .map(|r| r.number("count"))
            .sum()
    };
    let today = sum_for(&today_rows, None);
    let yesterday = sum_for(&yesterday_rows, None);

    Ok(ProductionSection {
        today,
        yesterday,
        diff: today - yesterday,
        percent_diff: percent_change(yesterday, today),
        per_controller: controllers
            .iter()
            .map(|c| ControllerProduction {
                controller_id: c.id.clone(),
                name: c.name.clone(),
                today: sum_for(&today_rows, Some(c.id.as_str())),
                yesterday: sum_for(&yesterday_rows, Some(c.id.as_str())),
            })
            .collect(),
    })
}

/// Hours left until the next service interval and the equivalent working days.
pub fn project_maintenance(servo_hours: f64, interval_hours: f64, duty_hours_per_day: f64) -> (f64, f64) {
    if interval_hours <= 0.0 || duty_hours_per_day <= 0.0 {
        return (0.0, 0.0);
    }
    let hours = interval_hours - servo_hours.max(0.0) % interval_hours;
    (hours, hours / duty_hours_per_day)
}

fn maintenance_section(
    ctx: &ReportContext<'_>,
    roster: &[Row],
    names: &HashMap<&str, &str>,
) -> Result<MaintenanceSection, SourceError> {
    let mut rows = ctx.tables.fetch(&Query::Maintenance)?;
    rows.sort_by_key(|r| std::cmp::Reverse(r.timestamp("performed_at")));
    let rs = &ctx.settings.report;

    let history: Vec<MaintenanceEntry> = rows
        .iter()
        .map(|r| {
            let cid = controller_id(r);
            MaintenanceEntry {
                name: names.get(cid.as_str()).copied().unwrap_or(UNKNOWN).to_string(),
                controller_id: cid,
                performed_at: r.timestamp("performed_at").map(fmt_time),
                description: r.text("description").unwrap_or_default(),
                servo_hours: r.number_opt("servo_hours"),
            }
        })
        .collect();

    let projections = roster
        .iter()
        .filter_map(|c| {
            let id = c.text("id").unwrap_or_default();
            // Live counter from the roster, else the reading at the latest service
            let servo_hours = c
                .number_opt("servo_hours")
                .or_else(|| history.iter().find(|h| h.controller_id == id).and_then(|h| h.servo_hours))?;
            let (hours, days) = project_maintenance(servo_hours, rs.maintenance_interval_hours, rs.duty_hours_per_day);
            // Empty when the projection runs past the calendar
            let projected = Duration::try_days(days.ceil() as i64)
                .and_then(|d| ctx.now.date().checked_add_signed(d))
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            Some(MaintenanceProjection {
                name: c.text_or("name", UNKNOWN),
                controller_id: id,
                servo_hours,
                hours_until_next: hours,
                days_until_next: days,
                projected_date: projected,
            })
        })
        .collect();

    Ok(MaintenanceSection { interval_hours: rs.maintenance_interval_hours, history, projections })
}

fn controller_log_report(ctx: &ReportContext<'_>, c: &ControllerInfo, failed: &mut Vec<String>) -> ControllerLogReport {
    let text = match ctx.logs.read_log(&c.ip) {
        Ok(t) => t.filter(|t| !t.trim().is_empty()),
        Err(e) => {
            tracing::warn!("Log for controller {} ({}) unavailable: {e}", c.id, c.ip);
            failed.push(format!("logs/{}", c.id));
            None
        }
    };
    let analysis = text.map(|t| LogAnalysis::from_text(&t, &ctx.settings.analysis, ctx.now));
    ControllerLogReport {
        controller_id: c.id.clone(),
        name: c.name.clone(),
        ip: c.ip.clone(),
        has_data: analysis.as_ref().is_some_and(|a| a.file.total_entries > 0),
        analysis,
    }
}

// ---- sinks ----

/// Receives the assembled report. Layout is the sink's business.
pub trait ReportSink {
    fn render(&mut self, report: &Report) -> Result<()>;
}

/// Writes the report as pretty-printed JSON.
pub struct JsonFileSink {
    pub path: PathBuf,
}

impl ReportSink for JsonFileSink {
    fn render(&mut self, report: &Report) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_vec_pretty(report)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::JsonTables;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-10 12:00:00", TIME_FMT).unwrap()
    }

    fn tables(v: serde_json::Value) -> JsonTables {
        JsonTables::from_json_str(&v.to_string()).unwrap()
    }

    fn run(t: &JsonTables) -> Result<Report, ReportError> {
        run_with(t, &Settings::default())
    }

    fn run_with(t: &JsonTables, settings: &Settings) -> Result<Report, ReportError> {
        let logs: HashMap<String, String> = HashMap::new();
        assemble(&ReportContext { tables: t, logs: &logs, settings, now: now() })
    }

    #[test]
    fn empty_roster_is_fatal() {
        let t = tables(json!({"controllers": []}));
        assert!(matches!(run(&t), Err(ReportError::NoControllers)));
        let t = tables(json!({}));
        assert!(matches!(run(&t), Err(ReportError::Roster(_))));
    }

    #[test]
    fn failing_sections_become_placeholders() {
        let t = tables(json!({
            "controllers": [{"id": 1, "name": "R1", "ip": "10.0.0.1"}],
            "production": [{"controller_id": 1, "date": "2024-05-10", "count": 30}]
        }));
        let report = run(&t).unwrap();
        assert_eq!(report.production.today, 30.0);
        assert_eq!(report.alarms, AlarmSection::default());
        for s in ["performance", "alarms", "backups", "maintenance"] {
            assert!(report.failed_sections.iter().any(|f| f == s), "{s}");
        }
        assert!(!report.logs[0].has_data);
        assert_eq!(report.controllers.controllers[0].status, "Unknown");
    }

    #[test]
    fn alarm_rollup() {
        let t = tables(json!({
            "controllers": [{"id": "c1", "name": "Welder", "ip": "10.0.0.1"}],
            "alarms": [
                {"controller_id": "c1", "code": "4100", "priority": "Major", "occurred_at": "2024-05-10 08:00:00"},
                {"controller_id": "c1", "code": "4100", "priority": "MAJOR", "occurred_at": "2024-05-08 08:00:00", "resolved_at": "2024-05-08 09:00:00"},
                {"controller_id": "c1", "code": "0020", "type": "minor", "occurred_at": "2024-05-07 08:00:00", "resolved_at": "2024-05-07 08:30:00"},
                {"controller_id": "c9", "code": "0030", "occurred_at": "2024-05-09 08:00:00"},
                {"controller_id": "c1", "code": "9999", "occurred_at": "2024-04-01 08:00:00"}
            ]
        }));
        let a = run(&t).unwrap().alarms;
        assert_eq!(a.total_in_window, 1);
        assert_eq!(a.total_in_period, 4);
        assert_eq!(a.active, 2);
        assert_eq!(a.codes[0], AlarmCodeCount { code: "4100".into(), name: String::new(), count: 2 });
        assert_eq!(a.codes.len(), 3);
        assert_eq!(a.severity, SeverityDistribution { major: 2, minor: 1, other: 1 });
        assert_eq!(a.recent[0].occurred_at.as_deref(), Some("2024-05-10 08:00:00"));
        assert_eq!(a.recent[0].controller_name, "Welder");
        assert_eq!(a.recent[1].controller_name, "Unknown");
    }

    #[test]
    fn backup_coverage() {
        let t = tables(json!({
            "controllers": [
                {"id": "a", "name": "A"}, {"id": "b", "name": "B"}, {"id": "c", "name": "C"}
            ],
            "backups": [
                {"controller_id": "a", "created_at": "2024-05-01 12:00:00"},
                {"controller_id": "a", "created_at": "2024-05-09 12:00:00"},
                {"controller_id": "b", "created_at": "2024-05-02 11:00:00"}
            ]
        }));
        let b = run(&t).unwrap().backups;
        assert_eq!(b.controllers[0].days_since, Some(1));
        assert!(!b.controllers[0].missing);
        assert_eq!(b.controllers[1].days_since, Some(8));
        assert!(b.controllers[1].missing);
        assert!(b.controllers[2].missing);
        assert_eq!(b.missing_count, 2);
    }

    #[test]
    fn production_and_performance_diffs() {
        let t = tables(json!({
            "controllers": [{"id": "a", "name": "A"}],
            "production": [
                {"controller_id": "a", "date": "2024-05-10", "count": 120},
                {"controller_id": "a", "date": "2024-05-09", "count": "100"}
            ],
            "utilization": [
                {"controller_id": "a", "recorded_at": "2024-05-09 00:00:00", "operating_rate": 60},
                {"controller_id": "a", "recorded_at": "2024-05-08 00:00:00", "operating_rate": 80},
                {"controller_id": "a", "recorded_at": "2024-05-01 00:00:00", "operating_rate": 50}
            ]
        }));
        let r = run(&t).unwrap();
        assert_eq!(r.production.diff, 20.0);
        assert_eq!(r.production.percent_diff, 20.0);
        assert_eq!(r.performance.current_average, 70.0);
        assert_eq!(r.performance.previous_average, 50.0);
        assert_eq!(r.performance.percent_diff, 40.0);
        assert_eq!(r.performance.per_controller[0].samples, 2);
    }

    #[test]
    fn maintenance_projection_uses_duty_cycle() {
        assert_eq!(project_maintenance(5800.0, 6000.0, 8.0), (200.0, 25.0));
        assert_eq!(project_maintenance(12000.0, 6000.0, 8.0), (6000.0, 750.0));
        assert_eq!(project_maintenance(100.0, 0.0, 8.0), (0.0, 0.0));

        let t = tables(json!({
            "controllers": [{"id": "a", "name": "A"}, {"id": "b", "name": "B", "servo_hours": 5992}],
            "maintenance": [
                {"controller_id": "a", "performed_at": "2024-01-01 00:00:00", "servo_hours": 1000, "description": "grease"},
                {"controller_id": "a", "performed_at": "2024-03-01 00:00:00", "servo_hours": 5920, "description": "battery"}
            ]
        }));
        let m = run(&t).unwrap().maintenance;
        assert_eq!(m.history[0].description, "battery");
        assert_eq!(m.projections.len(), 2);
        assert_eq!(m.projections[0].days_until_next, 10.0);
        assert_eq!(m.projections[1].hours_until_next, 8.0);
        assert_eq!(m.projections[1].projected_date, "2024-05-11");
    }

    #[test]
    fn out_of_range_periods_fail_their_sections_only() {
        let t = tables(json!({
            "controllers": [{"id": "a", "name": "A"}],
            "alarms": [{"controller_id": "a", "code": "1", "occurred_at": "2024-05-10 08:00:00"}],
            "utilization": [{"controller_id": "a", "recorded_at": "2024-05-09 00:00:00", "operating_rate": 60}],
            "production": [{"controller_id": "a", "date": "2024-05-10", "count": 5}]
        }));
        let mut settings = Settings::default();
        settings.report.period_days = u32::MAX;
        let r = run_with(&t, &settings).unwrap();
        assert!(r.failed_sections.iter().any(|f| f == "performance"));
        assert!(r.failed_sections.iter().any(|f| f == "alarms"));
        assert_eq!(r.performance, PerformanceSection::default());
        assert_eq!(r.production.today, 5.0);

        let mut settings = Settings::default();
        settings.report.alarm_window_hours = u32::MAX;
        let r = run_with(&t, &settings).unwrap();
        assert!(r.failed_sections.iter().any(|f| f == "alarms"));
        assert!(!r.failed_sections.iter().any(|f| f == "performance"));
    }

    #[test]
    fn projection_past_the_calendar_leaves_date_empty() {
        let t = tables(json!({
            "controllers": [{"id": "a", "name": "A", "servo_hours": 0}],
            "maintenance": []
        }));
        let mut settings = Settings::default();
        settings.report.maintenance_interval_hours = 1e10;
        let m = run_with(&t, &settings).unwrap().maintenance;
        assert_eq!(m.projections[0].hours_until_next, 1e10);
        assert_eq!(m.projections[0].projected_date, "");
    }
}
