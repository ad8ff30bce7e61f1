//! Latest-vs-previous comparisons of absolute-position and tool-offset events.

use crate::classify::{absolute_position_events, tool_edit_events};
use crate::model::{
    parse_log_date, percent_change, AbsolutePositionEvent, Axis, AxisComparison, LogRecord, TcpComparison,
    ToolEditEvent,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Number of adjacent pairs inspected for tool-offset changes.
pub const TCP_PAIR_LIMIT: usize = 5;

/// Something with a log position and an optional timestamp.
pub trait Chronological {
    fn index(&self) -> u64;
    fn timestamp(&self) -> Option<NaiveDateTime>;
}

impl Chronological for AbsolutePositionEvent {
    fn index(&self) -> u64 { self.index }
    fn timestamp(&self) -> Option<NaiveDateTime> { self.date.as_deref().and_then(parse_log_date) }
}

impl Chronological for ToolEditEvent {
    fn index(&self) -> u64 { self.index }
    fn timestamp(&self) -> Option<NaiveDateTime> { self.date.as_deref().and_then(parse_log_date) }
}

/// Newest first: by date descending, then index descending. Undated events go last.
pub fn sort_latest_first<T: Chronological>(events: &mut [T]) {
    events.sort_by_cached_key(|e| std::cmp::Reverse((e.timestamp(), e.index())));
}

/// Per-axis deltas between the two newest snapshots. Expects latest-first input.
pub fn compare_absolute(entries: &[AbsolutePositionEvent]) -> Vec<AxisComparison> {
    let [latest, previous, ..] = entries else { return Vec::new() };
    Axis::ALL
        .iter()
        .map(|&axis| {
            let old_value = previous.value(axis);
            let new_value = latest.value(axis);
            // Corrupt pulse counts can sit at the ends of the i64 range
            let change = new_value.saturating_sub(old_value);
            AxisComparison {
                axis,
                old_value,
                new_value,
                change,
                change_percent: percent_change(old_value as f64, new_value as f64),
            }
        })
        .collect()
}

/// Deltas between adjacent edits of the same tool slot. Expects latest-first input.
///
/// Only the first [`TCP_PAIR_LIMIT`] pairs are looked at. Pairs touching
/// different slots, or with non-numeric values, contribute nothing.
pub fn compare_tcp(entries: &[ToolEditEvent]) -> Vec<TcpComparison> {
    entries
        .windows(2)
        .take(TCP_PAIR_LIMIT)
        .filter_map(|pair| {
            let (newer, older) = (&pair[0], &pair[1]);
            if newer.element_number != older.element_number {
                return None;
            }
            let new_value = parse_value(&newer.element_value)?;
            let old_value = parse_value(&older.element_value)?;
            Some(TcpComparison {
                element_number: newer.element_number.clone(),
                tool_number: newer.element.actual_tool_number,
                parameter_group_name: newer.element.parameter_group_name.clone(),
                parameter_name: newer.element.parameter_name.clone(),
                old_value,
                new_value,
                change: new_value - old_value,
                change_percent: percent_change(old_value, new_value),
                old_index: older.index,
                new_index: newer.index,
                old_date: older.date.clone(),
                new_date: newer.date.clone(),
            })
        })
        .collect()
}

fn parse_value(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Histories and comparisons derived from one controller's records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub absolute_history: Vec<AbsolutePositionEvent>,
    pub absolute_comparisons: Vec<AxisComparison>,
    pub tool_history: Vec<ToolEditEvent>,
    pub tcp_comparisons: Vec<TcpComparison>,
}

pub fn analyze_changes(records: &[LogRecord]) -> ChangeAnalysis {
    let mut absolute_history = absolute_position_events(records);
    sort_latest_first(&mut absolute_history);
    let mut tool_history = tool_edit_events(records);
    sort_latest_first(&mut tool_history);
    ChangeAnalysis {
        absolute_comparisons: compare_absolute(&absolute_history),
        tcp_comparisons: compare_tcp(&tool_history),
        absolute_history,
        tool_history,
    }
}
