use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use robot_log_analyzer::config::Settings;
use robot_log_analyzer::report::{assemble, JsonFileSink, LogAnalysis, ReportContext, ReportSink};
use robot_log_analyzer::source::{FsLogProvider, JsonTables};
use robot_log_analyzer::viz::{save_operating_chart, ChartSink};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Robot Controller Log Analyzer
/// Parses LOGDATA.DAT controller logs, derives operating rates and position/tool changes,
/// and assembles fleet reports as JSON and charts. Can also run a GUI.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Settings file (TOML). Falls back to $ROBOT_LOG_CONFIG, then ./robot_log.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Launch GUI instead of CLI
    #[arg(long)]
    gui: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one or more log files or directories (recursively scanned for log files)
    Analyze {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Reference time for the analysis window. Examples: "2025-09-05 14:00:00", "2025-09-05"
        #[arg(long, value_name = "DATETIME")]
        now: Option<String>,

        /// Days of history in the operating-rate window
        #[arg(long)]
        window_days: Option<u32>,

        /// Save analysis JSON to this path
        #[arg(long)]
        json_out: Option<PathBuf>,

        /// Save a daily operating-rate chart (PNG); single input only
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },
    /// Assemble a fleet report from table data and controller logs
    Report {
        /// JSON object of row arrays: controllers, alarms, utilization, production, maintenance, backups
        #[arg(long)]
        tables: PathBuf,

        /// Directory holding one sub-directory per controller IP (repeatable)
        #[arg(long)]
        log_root: Vec<PathBuf>,

        #[arg(long, value_name = "DATETIME")]
        now: Option<String>,

        /// Save report JSON to this path
        #[arg(long)]
        json_out: Option<PathBuf>,

        /// Save an alarm-code bar chart (PNG)
        #[arg(long)]
        alarm_chart: Option<PathBuf>,

        /// Directory for per-controller operating-rate charts
        #[arg(long)]
        operating_chart: Option<PathBuf>,
    },
}

fn parse_now(s: Option<&str>) -> Result<NaiveDateTime> {
    let Some(val) = s else { return Ok(Local::now().naive_local()) };
    let tried = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
    for f in tried { if let Ok(dt) = NaiveDateTime::parse_from_str(val, f) { return Ok(dt); } }
    // A bare date means the end of that day
    if let Some(dt) = NaiveDate::parse_from_str(val, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(23, 59, 59)) {
        return Ok(dt);
    }
    anyhow::bail!("Could not parse datetime: {val}");
}

fn gather_log_files(paths: &[PathBuf], names: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for p in paths {
        if p.is_file() {
            out.push(p.clone());
        } else if p.is_dir() {
            for entry in WalkDir::new(p).sort_by_file_name().into_iter().flatten() {
                let path = entry.path();
                if path.is_file() {
                    let name = entry.file_name().to_string_lossy();
                    if names.iter().any(|n| name.eq_ignore_ascii_case(n)) { out.push(path.to_path_buf()); }
                }
            }
        }
    }
    out
}

fn run_analyze(
    mut settings: Settings,
    inputs: &[PathBuf],
    now: Option<&str>,
    window_days: Option<u32>,
    json_out: Option<&std::path::Path>,
    chart_out: Option<&std::path::Path>,
) -> Result<()> {
    let files = gather_log_files(inputs, &settings.sources.log_file_names);
    if files.is_empty() { anyhow::bail!("No log files found in provided inputs"); }
    if let Some(d) = window_days { settings.analysis.window_days = d; }
    let now = parse_now(now)?;

    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = std::fs::read(path).with_context(|| format!("Failed reading {path:?}"))?;
        let analysis = LogAnalysis::from_text(&String::from_utf8_lossy(&bytes), &settings.analysis, now);
        tracing::info!("Analyzed {} ({} records)", path.display(), analysis.file.total_entries);
        print_summary(path, &analysis);
        results.push((path.display().to_string(), analysis));
    }

    if let Some(path) = json_out {
        let by_file: serde_json::Map<String, serde_json::Value> = results
            .iter()
            .map(|(name, a)| Ok((name.clone(), serde_json::to_value(a)?)))
            .collect::<Result<_>>()?;
        std::fs::write(path, serde_json::to_vec_pretty(&by_file)?)?;
        println!("Saved JSON -> {}", path.display());
    }
    if let Some(path) = chart_out {
        if results.len() != 1 { anyhow::bail!("--chart-out needs exactly one input file, got {}", results.len()); }
        let (name, a) = &results[0];
        save_operating_chart(path, &format!("{name} operating rate"), &a.daily)
            .with_context(|| format!("Saving chart to {}", path.display()))?;
        println!("Saved chart -> {}", path.display());
    }
    Ok(())
}

fn print_summary(path: &std::path::Path, a: &LogAnalysis) {
    println!("====== {} ======", path.display());
    println!(
        "Records: {}{}",
        a.file.total_entries,
        if a.file.truncated { " (truncated)" } else { "" }
    );
    if let Some(first) = a.file.first_entry.as_deref() { println!("First entry: {first}"); }
    if let Some(last) = a.file.last_entry.as_deref() { println!("Last entry:  {last}"); }
    let s = &a.system_state;
    println!(
        "Last {} days: PLAY={:.1}% TEACH={:.1}% ERROR={:.1}% IDLE={:.1}% (trend {:+.1}%)",
        a.window_days, s.play_percent, s.teach_percent, s.error_percent, s.idle_percent, a.performance_trend
    );
    if !s.top_errors.is_empty() {
        println!("Top errors:");
        for (msg, n) in &s.top_errors { println!("  {n:>6}  {msg}"); }
    }
    if !a.changes.absolute_comparisons.is_empty() {
        println!("Absolute position changes:");
        for c in &a.changes.absolute_comparisons {
            println!("  {}  {:>10} -> {:>10}  ({:+}, {:+.2}%)", c.axis.label(), c.old_value, c.new_value, c.change, c.change_percent);
        }
    }
    if !a.changes.tcp_comparisons.is_empty() {
        println!("Tool changes:");
        for c in &a.changes.tcp_comparisons {
            println!(
                "  TOOL {} {:<3} {:>10} -> {:>10}  ({:+}, {:+.2}%)",
                c.tool_number, c.parameter_name, c.old_value, c.new_value, c.change, c.change_percent
            );
        }
    }
    println!();
}

fn run_report(
    mut settings: Settings,
    tables: &std::path::Path,
    log_roots: Vec<PathBuf>,
    now: Option<&str>,
    mut sinks: Vec<Box<dyn ReportSink>>,
) -> Result<()> {
    if !log_roots.is_empty() { settings.sources.log_roots = log_roots; }
    let tables = JsonTables::from_file(tables)?;
    let logs = FsLogProvider::from_settings(&settings.sources);
    let ctx = ReportContext { tables: &tables, logs: &logs, settings: &settings, now: parse_now(now)? };
    let report = assemble(&ctx)?;

    println!("====== REPORT {} ======", report.generated_at);
    println!("Controllers: {}", report.controllers.total);
    println!(
        "Alarms: {} in last {}h, {} active",
        report.alarms.total_in_window, report.alarms.window_hours, report.alarms.active
    );
    println!("Backups missing: {}", report.backups.missing_count);
    println!(
        "Production: today={} yesterday={} ({:+.1}%)",
        report.production.today, report.production.yesterday, report.production.percent_diff
    );
    if !report.failed_sections.is_empty() {
        println!("Unavailable sections: {}", report.failed_sections.join(", "));
    }

    for sink in &mut sinks {
        sink.render(&report)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    if cli.gui {
        #[cfg(feature = "gui")]
        { return robot_log_analyzer::ui::launch(settings.analysis); }
        #[cfg(not(feature = "gui"))]
        {
            eprintln!("This build has GUI disabled. Rebuild with `--features gui`.");
            std::process::exit(2);
        }
    }

    match cli.command {
        Some(Command::Analyze { inputs, now, window_days, json_out, chart_out }) => run_analyze(
            settings,
            &inputs,
            now.as_deref(),
            window_days,
            json_out.as_deref(),
            chart_out.as_deref(),
        ),
        Some(Command::Report { tables, log_root, now, json_out, alarm_chart, operating_chart }) => {
            let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();
            if let Some(path) = json_out { sinks.push(Box::new(JsonFileSink { path })); }
            if alarm_chart.is_some() || operating_chart.is_some() {
                sinks.push(Box::new(ChartSink { alarm_chart, operating_dir: operating_chart }));
            }
            run_report(settings, &tables, log_root, now.as_deref(), sinks)
        }
        None => anyhow::bail!("No command given; see --help"),
    }
}
