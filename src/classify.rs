//! Event classification over tokenized records.
//!
//! Every classifier is a pure function of one [`LogRecord`]. Records that do
//! not fit a classifier are skipped, never reported as errors.

use crate::model::{AbsolutePositionEvent, Axis, LogRecord, OperatingState, ParsedElement, ToolEditEvent};
use crate::parse::{lookup, marker_index};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const ERROR_KEYWORDS: [&str; 4] = ["error", "alarm", "fault", "emergency"];
pub const OPERATING_KEYWORDS: [&str; 5] = ["play", "run", "cycle", "production", "auto"];
pub const CRITICAL_KEYWORDS: [&str; 9] = [
    "emergency", "fault", "critical", "severe", "fatal", "collision", "overload", "temperature", "pressure",
];

const TOOL_DATA_PARAMS: [&str; 6] = ["X", "Y", "Z", "Rx", "Ry", "Rz"];
const TOOL_GEOMETRY_PARAMS: [&str; 6] = ["Xg", "Yg", "Zg", "Ix", "Iy", "Iz"];
const UNKNOWN: &str = "Unknown";

struct Patterns {
    file_name: Regex,
    element_number: Regex,
    element_value: Regex,
    axes: Vec<(Axis, Regex)>,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| {
    let re = |p: &str| Regex::new(p).expect("classifier regex");
    Patterns {
        file_name: re(r"FILE NAME\s*:\s*(\S+)"),
        element_number: re(r"ELEMENT NUMBER\s*:\s*([\d-]+)"),
        element_value: re(r"ELEMENT VALUE\s*:\s*([-+]?\d+(?:\.\d+)?)"),
        axes: Axis::ALL
            .iter()
            .map(|&a| (a, re(&format!(r"\b{}\s+([-+]?\d+)", a.label()))))
            .collect(),
    }
});

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ---- absolute position ----

pub fn is_absolute_position(record: &LogRecord) -> bool {
    record.event_lower().contains("org abso")
}

/// Reduce an `ORG ABSO` record. `None` without a `CURR VALUE` block.
pub fn absolute_position(record: &LogRecord) -> Option<AbsolutePositionEvent> {
    if !is_absolute_position(record) {
        return None;
    }
    let current_values = parse_current_values(&record.raw_data)?;
    Some(AbsolutePositionEvent {
        index: record.index,
        date: record.date.clone(),
        group_number: record.any_field(&["GROUP NUMBER", "GROUP"]).map(str::to_string),
        axis_number: record.any_field(&["AXIS NUMBER", "AXIS"]).map(str::to_string),
        set_value: record.field("SET VALUE").map(str::to_string),
        current_values,
    })
}

/// Per-axis pulse values of the `CURR VALUE` block in `text`.
///
/// Scanning starts on the `CURR VALUE` line itself and ends at the next
/// `///INDEX` marker or the end of the text. First value per axis wins.
pub fn parse_current_values(text: &str) -> Option<BTreeMap<Axis, i64>> {
    let mut lines = text.lines();
    let first = lines.by_ref().find_map(|l| {
        let t = l.trim_start();
        t.get(..10)
            .filter(|p| p.eq_ignore_ascii_case("CURR VALUE"))
            .map(|_| t[10..].trim_start().trim_start_matches(':'))
    })?;

    let mut values = BTreeMap::new();
    for line in std::iter::once(first).chain(lines) {
        if line.trim_start().starts_with("///INDEX") || marker_index(line).is_some() {
            break;
        }
        for (axis, re) in &PATTERNS.axes {
            // `R1` is the group label, not the R axis
            if *axis == Axis::R && line.contains("R1") {
                continue;
            }
            if values.contains_key(axis) {
                continue;
            }
            if let Some(v) = re.captures(line).and_then(|c| c[1].parse::<i64>().ok()) {
                values.insert(*axis, v);
            }
        }
    }
    Some(values)
}

pub fn absolute_position_events(records: &[LogRecord]) -> Vec<AbsolutePositionEvent> {
    records.iter().filter_map(absolute_position).collect()
}

// ---- tool / TCP edits ----

pub fn is_file_edit(record: &LogRecord) -> bool {
    let ev = record.event_lower();
    ev.contains("other file edit") || ev.contains("other file edt")
}

/// Reduce an edit of the `tool` file. `None` when the element does not decode.
pub fn tool_edit(record: &LogRecord) -> Option<ToolEditEvent> {
    if !is_file_edit(record) {
        return None;
    }
    let p = &*PATTERNS;
    let file = lookup(record, "FILE NAME", &p.file_name)?;
    if !file.value.eq_ignore_ascii_case("tool") {
        return None;
    }
    let number = lookup(record, "ELEMENT NUMBER", &p.element_number)?.value;
    let value = lookup(record, "ELEMENT VALUE", &p.element_value)
        .map(|l| l.value)
        .or_else(|| record.field("AFTER EDIT").map(|v| v.trim().to_string()))?;
    let element = decode_element(&number)?;
    Some(ToolEditEvent {
        index: record.index,
        date: record.date.clone(),
        event: record.event.clone().unwrap_or_default(),
        element_number: number,
        element_value: value,
        element,
    })
}

/// Decode `N-M-K`: tool `N` (1-based), parameter group `M`, parameter `K`.
pub fn decode_element(number: &str) -> Option<ParsedElement> {
    let parts: Vec<u32> = number
        .trim()
        .split('-')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    let [tool, group, param] = parts[..] else { return None };

    let (group_name, names): (&str, Option<&[&str; 6]>) = match group {
        1 => ("TOOL Data", Some(&TOOL_DATA_PARAMS)),
        2 => ("TOOL Data (M=2)", Some(&TOOL_DATA_PARAMS)),
        9 => ("TOOL Geometry", Some(&TOOL_GEOMETRY_PARAMS)),
        _ => (UNKNOWN, None),
    };
    let name = names
        .and_then(|n| n.get(param as usize))
        .copied()
        .unwrap_or(UNKNOWN);

    Some(ParsedElement {
        tool_number: tool,
        parameter_group: group,
        parameter_group_name: group_name.to_string(),
        parameter_index: param,
        parameter_name: name.to_string(),
        actual_tool_number: i64::from(tool) - 1,
    })
}

pub fn tool_edit_events(records: &[LogRecord]) -> Vec<ToolEditEvent> {
    records.iter().filter_map(tool_edit).collect()
}

// ---- state predicates ----

pub fn is_error_event(record: &LogRecord) -> bool {
    contains_any(&record.event_lower(), &ERROR_KEYWORDS)
}

pub fn is_teach_mode(record: &LogRecord) -> bool {
    ["MODE", "ROBOT MODE"]
        .iter()
        .filter_map(|k| record.field_lower(k))
        .any(|m| m.contains("teach"))
}

pub fn is_operating(record: &LogRecord) -> bool {
    let ev = record.event_lower();
    if contains_any(&ev, &ERROR_KEYWORDS) {
        return false;
    }
    contains_any(&ev, &OPERATING_KEYWORDS) || (!is_teach_mode(record) && !ev.trim().is_empty())
}

pub fn is_critical(record: &LogRecord) -> bool {
    contains_any(&record.event_lower(), &CRITICAL_KEYWORDS)
}

/// Single state per record: error, then operating, then teach, else idle.
pub fn operating_state(record: &LogRecord) -> OperatingState {
    if is_error_event(record) {
        OperatingState::Error
    } else if is_operating(record) {
        OperatingState::Operating
    } else if is_teach_mode(record) {
        OperatingState::Teach
    } else {
        OperatingState::Idle
    }
}
