use crate::model::DailyOperatingData;
use crate::report::{AlarmSection, Report, ReportSink};
use anyhow::Result;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Codes drawn in the alarm chart; the JSON report keeps them all.
const MAX_CHART_CODES: usize = 20;

pub fn save_alarm_barchart(path: &Path, alarms: &AlarmSection) -> Result<()> {
    let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let codes: Vec<_> = alarms.codes.iter().take(MAX_CHART_CODES).collect();
    let n = codes.len().max(1) as i32;
    let max_y = codes.iter().map(|c| c.count).max().unwrap_or(1);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Alarms per Code", ("sans-serif", 28))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0i32..n, 0u64..(max_y + max_y / 5 + 1))?;

    chart
        .configure_mesh()
        .x_labels(codes.len().max(1))
        .x_label_formatter(&|x| {
            codes.get(*x as usize).map(|c| c.code.clone()).unwrap_or_default()
        })
        .y_desc("Count")
        .draw()?;

    for (i, c) in codes.iter().enumerate() {
        let x0 = i as i32;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x0, 0u64), (x0 + 1, c.count)],
            RGBColor(200, 60 + (i * 8 % 120) as u8, 60).filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Daily operating and error rates (percent) of one controller.
pub fn save_operating_chart(path: &Path, title: &str, daily: &[DailyOperatingData]) -> Result<()> {
    let root = BitMapBackend::new(path, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = daily.len().max(1);
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 28))
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..(n as i32 - 1).max(1), 0f64..100f64)?;

    chart
        .configure_mesh()
        .y_desc("Rate (%)")
        .x_desc("Day")
        .x_labels(n.min(14))
        .x_label_formatter(&|i| {
            daily.get(*i as usize).map(|d| d.date.format("%m-%d").to_string()).unwrap_or_default()
        })
        .draw()?;

    let series = |f: fn(&DailyOperatingData) -> f64| {
        daily.iter().enumerate().map(move |(i, d)| (i as i32, f(d))).collect::<Vec<_>>()
    };
    chart
        .draw_series(LineSeries::new(series(|d| d.operating_rate), &BLUE))?
        .label("operating")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
    chart
        .draw_series(LineSeries::new(series(|d| d.error_rate), &RED))?
        .label("error")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    chart.configure_series_labels().border_style(BLACK).draw()?;

    root.present()?;
    Ok(())
}

/// Renders the report's charts as PNG files.
pub struct ChartSink {
    pub alarm_chart: Option<PathBuf>,
    /// One `operating_<controller>.png` per controller with log data
    pub operating_dir: Option<PathBuf>,
}

impl ReportSink for ChartSink {
    fn render(&mut self, report: &Report) -> Result<()> {
        if let Some(path) = &self.alarm_chart {
            save_alarm_barchart(path, &report.alarms)?;
        }
        if let Some(dir) = &self.operating_dir {
            std::fs::create_dir_all(dir)?;
            for log in &report.logs {
                let Some(a) = log.analysis.as_ref().filter(|a| !a.daily.is_empty()) else { continue };
                let file = dir.join(format!("operating_{}.png", sanitize(&log.controller_id)));
                save_operating_chart(&file, &format!("{} operating rate", log.name), &a.daily)?;
            }
        }
        Ok(())
    }
}

fn sanitize(id: &str) -> String {
    id.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect()
}
