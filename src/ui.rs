#![cfg(feature = "gui")]

use crate::config::AnalysisSettings;
use crate::parse::MAX_RECORDS;
use crate::report::LogAnalysis;
use chrono::{Local, NaiveDateTime};
use eframe::{egui, App};
use egui::{ComboBox, RichText};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Line, Plot, PlotPoints};
use rfd::FileDialog;
use std::path::PathBuf;

pub fn launch(settings: AnalysisSettings) -> anyhow::Result<()> {
    let native_options = eframe::NativeOptions::default();
    // eframe::Error is not Send/Sync, go through a string
    eframe::run_native(
        "Robot Log Analyzer",
        native_options,
        Box::new(move |_cc| Ok(Box::new(GuiApp::new(settings)))),
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

struct GuiApp {
    file: Option<PathBuf>,
    settings: AnalysisSettings,
    now: String,
    analysis: Option<LogAnalysis>,
    info_text: String,
}

impl GuiApp {
    fn new(settings: AnalysisSettings) -> Self {
        Self {
            file: None,
            settings,
            now: String::new(),
            analysis: None,
            info_text: String::new(),
        }
    }
}

impl App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.heading(RichText::new("Robot Controller Log Analyzer").size(24.0));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open LOGDATA.DAT...").clicked() {
                    if let Some(p) = FileDialog::new().add_filter("Controller log", &["DAT", "dat"]).pick_file() {
                        self.file = Some(p);
                        self.info_text.clear();
                        self.analysis = None;
                    }
                }
                if let Some(f) = &self.file {
                    ui.label(f.display().to_string());
                }
            });

            ui.separator();

            ui.horizontal(|ui| {
                ui.add(egui::TextEdit::singleline(&mut self.now).hint_text("now: YYYY-MM-DD HH:MM:SS"));
                ComboBox::from_label("Window")
                    .selected_text(format!("{} days", self.settings.window_days))
                    .show_ui(ui, |ui| {
                        for d in [1u32, 7, 14, 30] {
                            ui.selectable_value(&mut self.settings.window_days, d, format!("{d} days"));
                        }
                    });
                if ui.button("Analyze").clicked() {
                    self.run_analysis();
                }
            });

            if !self.info_text.is_empty() {
                ui.label(self.info_text.clone());
            }

            if let Some(a) = &self.analysis {
                egui::ScrollArea::vertical().show(ui, |ui| show_analysis(ui, a));
            }
        });
    }
}

fn show_analysis(ui: &mut egui::Ui, a: &LogAnalysis) {
    ui.separator();
    ui.label(RichText::new("Summary").strong());
    ui.label(format!(
        "Records: {}{} | Outside window: {}",
        a.file.total_entries,
        if a.file.truncated { format!(" (truncated at {MAX_RECORDS})") } else { String::new() },
        a.excluded_from_window
    ));
    let s = &a.system_state;
    ui.label(format!(
        "PLAY {:.1}%  TEACH {:.1}%  ERROR {:.1}%  IDLE {:.1}%  | trend {:+.1}%",
        s.play_percent, s.teach_percent, s.error_percent, s.idle_percent, a.performance_trend
    ));

    ui.add_space(8.0);
    ui.label(RichText::new("Daily operating data").strong());
    ui.push_id("daily", |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .columns(Column::auto(), 6)
            .header(20.0, |mut h| {
                for title in ["Date", "Entries", "Operating", "Teach", "Error", "Critical"] {
                    h.col(|ui| { ui.strong(title); });
                }
            })
            .body(|mut body| {
                for d in &a.daily {
                    body.row(20.0, |mut row| {
                        row.col(|ui| { ui.label(d.date.to_string()); });
                        row.col(|ui| { ui.label(d.total.to_string()); });
                        row.col(|ui| { ui.label(format!("{:.1}%", d.operating_rate)); });
                        row.col(|ui| { ui.label(format!("{:.1}%", d.teach_rate)); });
                        row.col(|ui| { ui.label(format!("{:.1}%", d.error_rate)); });
                        row.col(|ui| { ui.label(d.critical_events.to_string()); });
                    });
                }
            });
    });

    let points: Vec<[f64; 2]> = a.daily.iter().enumerate().map(|(i, d)| [i as f64, d.operating_rate]).collect();
    Plot::new("operating").view_aspect(3.0).legend(Legend::default()).show(ui, |pui| {
        pui.line(Line::new(PlotPoints::from(points)).name("operating %"));
    });

    ui.add_space(8.0);
    ui.label(RichText::new("Top errors").strong());
    for (msg, n) in &s.top_errors {
        ui.label(format!("{n:>6}  {msg}"));
    }

    ui.add_space(8.0);
    ui.label(RichText::new("Absolute position (latest vs previous)").strong());
    if a.changes.absolute_comparisons.is_empty() {
        ui.label("Fewer than two ORG ABSO records");
    }
    ui.push_id("abso", |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .columns(Column::auto(), 5)
            .body(|mut body| {
                for c in &a.changes.absolute_comparisons {
                    body.row(20.0, |mut row| {
                        row.col(|ui| { ui.label(c.axis.label()); });
                        row.col(|ui| { ui.label(c.old_value.to_string()); });
                        row.col(|ui| { ui.label(c.new_value.to_string()); });
                        row.col(|ui| { ui.label(format!("{:+}", c.change)); });
                        row.col(|ui| { ui.label(format!("{:+.2}%", c.change_percent)); });
                    });
                }
            });
    });

    ui.add_space(8.0);
    ui.label(RichText::new("Tool / TCP changes").strong());
    ui.push_id("tcp", |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .columns(Column::auto(), 5)
            .body(|mut body| {
                for c in &a.changes.tcp_comparisons {
                    body.row(20.0, |mut row| {
                        row.col(|ui| { ui.label(format!("TOOL {} {}", c.tool_number, c.parameter_name)); });
                        row.col(|ui| { ui.label(c.old_value.to_string()); });
                        row.col(|ui| { ui.label(c.new_value.to_string()); });
                        row.col(|ui| { ui.label(format!("{:+}", c.change)); });
                        row.col(|ui| { ui.label(format!("{:+.2}%", c.change_percent)); });
                    });
                }
            });
    });
}

impl GuiApp {
    fn run_analysis(&mut self) {
        let Some(path) = self.file.as_ref() else {
            self.info_text = "Select a LOGDATA.DAT file first".into();
            return;
        };
        let now = if self.now.trim().is_empty() {
            Local::now().naive_local()
        } else {
            match NaiveDateTime::parse_from_str(self.now.trim(), "%Y-%m-%d %H:%M:%S") {
                Ok(t) => t,
                Err(e) => {
                    self.info_text = format!("Bad time: {e}");
                    return;
                }
            }
        };
        match std::fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                self.analysis = Some(LogAnalysis::from_text(&text, &self.settings, now));
                self.info_text.clear();
            }
            Err(e) => self.info_text = format!("Read error: {e}"),
        }
    }
}
