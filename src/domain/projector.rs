//! Row projection — turns a process record plus its machine into a table row.
//!
//! The column layout is a per-instance [`ColumnSchema`]. Each column names the
//! record field it shows, how the value is formatted, how the column sorts,
//! and optionally which tooltip it carries.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use textwrap::{Options, WordSeparator, WordSplitter, WrapAlgorithm};
use thiserror::Error;

use super::record::ProcessRecord;

/// Default tooltip wrap width, in characters.
pub const DEFAULT_WRAP_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    NodeName,
    Machine,
    Pid,
    CpuPercent,
    MemoryPercent,
    NumThreads,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeName => "node_name",
            Self::Machine => "machine",
            Self::Pid => "pid",
            Self::CpuPercent => "cpu_percent",
            Self::MemoryPercent => "memory_percent",
            Self::NumThreads => "num_threads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFormat {
    /// Value as-is.
    Plain,
    /// Fixed point, two decimals.
    Fixed2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    Text,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tooltip {
    /// Command line, word-wrapped.
    Cmdline,
    /// Resident and virtual memory in MiB.
    MemoryInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub field: Field,
    pub label: String,
    pub format: CellFormat,
    pub sort_type: SortType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Tooltip>,
}

impl Column {
    fn new(field: Field, label: &str, format: CellFormat, sort_type: SortType) -> Self {
        Self {
            field,
            label: label.to_string(),
            format,
            sort_type,
            tooltip: None,
        }
    }

    fn with_tooltip(mut self, tooltip: Tooltip) -> Self {
        self.tooltip = Some(tooltip);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub columns: Vec<Column>,
    pub wrap_width: usize,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        use CellFormat::*;
        use SortType::*;

        Self {
            columns: vec![
                Column::new(Field::NodeName, "Node", Plain, Text).with_tooltip(Tooltip::Cmdline),
                Column::new(Field::Machine, "Machine", Plain, Text),
                Column::new(Field::Pid, "PID", Plain, Text),
                Column::new(Field::CpuPercent, "CPU %", Fixed2, Numeric)
                    .with_tooltip(Tooltip::MemoryInfo),
                Column::new(Field::MemoryPercent, "Mem %", Fixed2, Numeric),
                Column::new(Field::NumThreads, "Num Threads", Plain, Numeric),
            ],
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl ColumnSchema {
    pub fn with_wrap_width(mut self, wrap_width: usize) -> Self {
        self.wrap_width = wrap_width;
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Resolve a column from an index, a field name, or a label
    /// (case-insensitive).
    pub fn resolve(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>() {
            return (index < self.columns.len()).then_some(index);
        }
        self.columns.iter().position(|c| {
            c.field.name().eq_ignore_ascii_case(key) || c.label.eq_ignore_ascii_case(key)
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ProjectError {
    #[error("column '{column}' expects a number, got '{value}'")]
    NotNumeric { column: String, value: String },
}

/// One rendered table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    /// Selection key.
    pub node_name: String,
    pub machine: String,
    /// Formatted values, one per schema column.
    pub cells: Vec<String>,
    pub visible: bool,
    pub selected: bool,
    /// Tooltip text keyed by column index.
    #[serde(default)]
    pub tooltips: BTreeMap<usize, String>,
    #[serde(skip)]
    sort_keys: Vec<Option<f64>>,
    /// Position in projection order, the final sort tiebreak.
    #[serde(skip)]
    pub(super) ordinal: usize,
}

impl DisplayRow {
    /// Numeric sort key for a column, if it sorts numerically.
    pub fn sort_key(&self, column: usize) -> Option<f64> {
        self.sort_keys.get(column).copied().flatten()
    }

    pub fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

enum Value<'a> {
    Text(&'a str),
    Float(f64),
}

fn field_value<'a>(field: Field, machine: &'a str, record: &'a ProcessRecord) -> Value<'a> {
    match field {
        Field::NodeName => Value::Text(&record.node_name),
        Field::Machine => Value::Text(machine),
        Field::Pid => Value::Text(&record.pid),
        Field::CpuPercent => Value::Float(record.cpu_percent),
        Field::MemoryPercent => Value::Float(record.memory_percent),
        Field::NumThreads => Value::Text(&record.num_threads),
    }
}

fn format_cell(column: &Column, value: Value<'_>) -> Result<String, ProjectError> {
    match (column.format, value) {
        (CellFormat::Plain, Value::Text(s)) => Ok(s.to_string()),
        (CellFormat::Plain, Value::Float(f)) => Ok(f.to_string()),
        (CellFormat::Fixed2, Value::Float(f)) => Ok(format!("{:.2}", f)),
        (CellFormat::Fixed2, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| format!("{:.2}", f))
            .map_err(|_| not_numeric(column, s)),
    }
}

fn not_numeric(column: &Column, value: &str) -> ProjectError {
    ProjectError::NotNumeric {
        column: column.label.clone(),
        value: value.to_string(),
    }
}

/// Project a record into a row. Visibility defaults to shown and selection
/// to unselected; the view model sets both.
pub fn project(
    schema: &ColumnSchema,
    machine: &str,
    record: &ProcessRecord,
) -> Result<DisplayRow, ProjectError> {
    let mut cells = Vec::with_capacity(schema.len());
    let mut sort_keys = Vec::with_capacity(schema.len());
    let mut tooltips = BTreeMap::new();

    for (index, column) in schema.columns.iter().enumerate() {
        let text = format_cell(column, field_value(column.field, machine, record))?;
        let key = match column.sort_type {
            SortType::Text => None,
            SortType::Numeric => Some(
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| not_numeric(column, &text))?,
            ),
        };
        cells.push(text);
        sort_keys.push(key);

        if let Some(tooltip) = column.tooltip {
            tooltips.insert(index, tooltip_text(tooltip, record, schema.wrap_width));
        }
    }

    Ok(DisplayRow {
        node_name: record.node_name.clone(),
        machine: machine.to_string(),
        cells,
        visible: true,
        selected: false,
        tooltips,
        sort_keys,
        ordinal: 0,
    })
}

fn tooltip_text(tooltip: Tooltip, record: &ProcessRecord, wrap_width: usize) -> String {
    match tooltip {
        Tooltip::Cmdline => wrap_words(&record.cmdline.join(" "), wrap_width).join("\n"),
        Tooltip::MemoryInfo => format!(
            "Resident: {:.2} MiB, Virtual: {:.2} MiB",
            record.memory_info.resident_mib(),
            record.memory_info.virtual_mib()
        ),
    }
}

/// Greedy word wrap that breaks at spaces and after hyphens. Words longer
/// than a line are split across lines.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let options = Options::new(width.max(1))
        .word_separator(WordSeparator::AsciiSpace)
        .word_splitter(WordSplitter::HyphenSplitter)
        .wrap_algorithm(WrapAlgorithm::FirstFit)
        .break_words(true);
    textwrap::wrap(text, options)
        .into_iter()
        .map(Cow::into_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{MemoryInfo, MIB};

    fn sample() -> ProcessRecord {
        ProcessRecord {
            node_name: "/talker".to_string(),
            pid: "42".to_string(),
            cpu_percent: 12.345,
            memory_percent: 0.5,
            num_threads: "3".to_string(),
            cmdline: vec!["python".to_string(), "talker.py".to_string()],
            memory_info: MemoryInfo {
                rss: 1.5 * MIB,
                vms: 300.0 * MIB,
            },
        }
    }

    #[test]
    fn formats_cells_in_schema_order() {
        let row = project(&ColumnSchema::default(), "m1", &sample()).unwrap();
        assert_eq!(row.cells, vec!["/talker", "m1", "42", "12.35", "0.50", "3"]);
        assert_eq!(row.node_name, "/talker");
        assert_eq!(row.machine, "m1");
        assert!(row.visible);
        assert!(!row.selected);
    }

    #[test]
    fn numeric_columns_carry_sort_keys() {
        let row = project(&ColumnSchema::default(), "m1", &sample()).unwrap();
        assert_eq!(row.sort_key(0), None);
        assert_eq!(row.sort_key(2), None);
        assert_eq!(row.sort_key(3), Some(12.35));
        assert_eq!(row.sort_key(5), Some(3.0));
    }

    #[test]
    fn builds_tooltips() {
        let row = project(&ColumnSchema::default(), "m1", &sample()).unwrap();
        assert_eq!(row.tooltips[&0], "python talker.py");
        assert_eq!(row.tooltips[&3], "Resident: 1.50 MiB, Virtual: 300.00 MiB");
        assert_eq!(row.tooltips.len(), 2);
    }

    #[test]
    fn non_numeric_thread_count_fails() {
        let mut record = sample();
        record.num_threads = "many".to_string();

        let err = project(&ColumnSchema::default(), "m1", &record).unwrap_err();
        assert_eq!(
            err,
            ProjectError::NotNumeric {
                column: "Num Threads".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn wraps_long_command_lines() {
        let text = "aaa bbb ccc dddd";
        assert_eq!(wrap_words(text, 7), vec!["aaa bbb", "ccc", "dddd"]);
        assert_eq!(wrap_words("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap_words("", 10).is_empty());
    }

    #[test]
    fn wraps_after_hyphens() {
        assert_eq!(wrap_words("aaaa-bbbb cc", 6), vec!["aaaa-", "bbbb", "cc"]);
        assert_eq!(
            wrap_words("/tmp/log-talker-stdout.log", 16),
            vec!["/tmp/log-talker-", "stdout.log"]
        );
    }

    #[test]
    fn cmdline_tooltip_wraps_at_schema_width() {
        let mut record = sample();
        record.cmdline = vec!["x".repeat(5), "y".repeat(5), "z".repeat(5)];
        let schema = ColumnSchema::default().with_wrap_width(11);

        let row = project(&schema, "m1", &record).unwrap();
        assert_eq!(row.tooltips[&0], "xxxxx yyyyy\nzzzzz");
    }

    #[test]
    fn resolves_columns_by_index_field_or_label() {
        let schema = ColumnSchema::default();
        assert_eq!(schema.resolve("3"), Some(3));
        assert_eq!(schema.resolve("cpu_percent"), Some(3));
        assert_eq!(schema.resolve("cpu %"), Some(3));
        assert_eq!(schema.resolve("Num Threads"), Some(5));
        assert_eq!(schema.resolve("6"), None);
        assert_eq!(schema.resolve("uptime"), None);
    }
}
