use serde_json::{Map, Value};

use crate::error::ExplorerError;

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// Result of one successfully executed statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    RowsAffected(u64),
}

impl QueryOutput {
    pub fn rows(&self) -> &[Row] {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::RowsAffected(_) => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::RowsAffected(_) => Vec::new(),
        }
    }

    /// Values of one column as strings, skipping NULLs
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.rows()
            .iter()
            .filter_map(|row| row_string(row, column))
            .collect()
    }
}

/// Read a column as a string, tolerating numbers and case differences in the column name
pub fn row_string(row: &Row, column: &str) -> Option<String> {
    let value = row.get(column).or_else(|| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    })?;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Outcome of one statement inside a batch
#[derive(Debug)]
pub struct StatementOutcome {
    pub statement: String,
    pub result: Result<QueryOutput, ExplorerError>,
}

impl StatementOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-statement outcomes of a best-effort batch, in execution order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<StatementOutcome>,
    pub execution_time_ms: u64,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(StatementOutcome::is_success)
    }

    /// One-line summary for notifications, naming each failed statement
    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .failures()
            .map(|o| match &o.result {
                Err(e) => format!("{} ({})", o.statement, e.user_message()),
                Ok(_) => o.statement.clone(),
            })
            .collect();

        if failed.is_empty() {
            format!("{} statement(s) succeeded", self.succeeded())
        } else {
            format!(
                "{} of {} statement(s) failed: {}",
                failed.len(),
                self.len(),
                failed.join("; ")
            )
        }
    }
}
