//! Tabular query results and their bounded text rendering.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Maximum number of rows included in a result's text rendering.
pub const DEFAULT_RENDER_ROW_CAP: usize = 100;

/// A single value in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("None"),
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Real(v) => f.write_str(&format_real(*v)),
            CellValue::Text(v) => f.write_str(v),
        }
    }
}

/// Formats a float with at most six decimals, dropping trailing zeros but
/// always keeping one digit after the point.
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let mut text = format!("{:.6}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    text
}

/// Rows returned by the tabular store.
///
/// Holds every row (the compute stage binds whole tables) plus a rendering
/// capped at `row_cap` rows, which is what goes into prompts. The rendering
/// is built on first access; bound tables never need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    row_cap: usize,
    #[serde(skip)]
    rendered: OnceLock<String>,
}

impl PartialEq for TabularResult {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.rows == other.rows && self.row_cap == other.row_cap
    }
}

impl TabularResult {
    /// Builds a result whose rendering shows at most `row_cap` rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>, row_cap: usize) -> Self {
        Self {
            columns,
            rows,
            row_cap,
            rendered: OnceLock::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bounded text rendering suitable for embedding in a prompt.
    pub fn rendered(&self) -> &str {
        self.rendered
            .get_or_init(|| render(&self.columns, &self.rows, self.row_cap))
    }

    /// Rows as JSON records (`[{column: value, ...}, ...]`).
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| {
                        let value = serde_json::to_value(cell).unwrap_or(serde_json::Value::Null);
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

fn render(columns: &[String], rows: &[Vec<CellValue>], row_cap: usize) -> String {
    if rows.is_empty() {
        return "Query returned no results.".to_string();
    }

    let shown = &rows[..rows.len().min(row_cap)];
    let cells: Vec<Vec<String>> = shown
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let format_line = |values: &[String]| -> String {
        values
            .iter()
            .zip(widths.iter())
            .map(|(value, width)| format!("{:>width$}", value, width = *width))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = format!(
        "Query executed successfully. Returned {} rows.\n\n",
        rows.len()
    );
    out.push_str(&format_line(columns));
    for row in &cells {
        out.push('\n');
        out.push_str(&format_line(row));
    }
    if rows.len() > shown.len() {
        out.push_str(&format!("\n... ({} rows total)", rows.len()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan_type_averages() -> TabularResult {
        TabularResult::new(
            vec!["loan_type".to_string(), "avg_amount".to_string()],
            vec![
                vec![CellValue::Text("Auto".into()), CellValue::Real(251234.5)],
                vec![CellValue::Text("Mortgage".into()), CellValue::Real(248001.25)],
            ],
            DEFAULT_RENDER_ROW_CAP,
        )
    }

    #[test]
    fn test_render_header_and_count() {
        let result = loan_type_averages();
        let text = result.rendered();

        assert!(text.starts_with("Query executed successfully. Returned 2 rows.\n\n"));
        assert!(text.contains("loan_type"));
        assert!(text.contains(" Mortgage  248001.25"));
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_render_right_aligns_columns() {
        let result = loan_type_averages();
        let lines: Vec<&str> = result.rendered().lines().skip(2).collect();
        assert_eq!(lines[0], "loan_type avg_amount");
        assert_eq!(lines[1], "     Auto   251234.5");
    }

    #[test]
    fn test_render_empty_result() {
        let result = TabularResult::new(vec!["n".to_string()], vec![], DEFAULT_RENDER_ROW_CAP);
        assert_eq!(result.rendered(), "Query returned no results.");
        assert!(result.is_empty());
    }

    #[test]
    fn test_render_caps_rows_but_keeps_all() {
        let rows: Vec<Vec<CellValue>> = (0..150).map(|i| vec![CellValue::Integer(i)]).collect();
        let result = TabularResult::new(vec!["id".to_string()], rows, 100);

        assert_eq!(result.row_count(), 150);
        assert!(result.rendered().contains("Returned 150 rows"));
        assert!(result.rendered().ends_with("... (150 rows total)"));
        // header + 100 data rows + blank + summary + trailer
        assert_eq!(result.rendered().lines().count(), 104);
    }

    #[test]
    fn test_rendering_built_on_first_access() {
        let rows: Vec<Vec<CellValue>> = (0..5000).map(|i| vec![CellValue::Integer(i)]).collect();
        let result = TabularResult::new(vec!["id".to_string()], rows, DEFAULT_RENDER_ROW_CAP);
        assert!(result.rendered.get().is_none());

        assert_eq!(result.to_records().len(), 5000);
        assert!(result.rendered.get().is_none());

        assert!(result.rendered().ends_with("... (5000 rows total)"));
        assert!(result.rendered.get().is_some());
    }

    #[test]
    fn test_equality_ignores_rendering_state() {
        let rendered = loan_type_averages();
        let _ = rendered.rendered();
        assert_eq!(rendered, loan_type_averages());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Null.to_string(), "None");
        assert_eq!(CellValue::Real(3.0).to_string(), "3.0");
        assert_eq!(CellValue::Real(0.081234567).to_string(), "0.081235");
        assert_eq!(CellValue::Integer(-4).to_string(), "-4");
    }

    #[test]
    fn test_to_records() {
        let records = loan_type_averages().to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["loan_type"], serde_json::json!("Auto"));
        assert_eq!(records[1]["avg_amount"], serde_json::json!(248001.25));
    }
}
