//! Append-only record of per-file batch outcomes.

use std::fmt;

use serde::Serialize;

/// Longest error summary kept in a ledger row.
pub const MAX_ERROR_CHARS: usize = 100;

/// Prefix written in front of failure messages in the CSV ledger.
pub const ERROR_CELL_PREFIX: &str = "ERROR: ";

pub const CSV_HEADER: &str = "file_name,COGs_created";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { destination_name: String },
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingRecord {
    pub source_id: String,
    pub outcome: Outcome,
}

impl ProcessingRecord {
    pub fn success(source_id: impl Into<String>, destination_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: Outcome::Success {
                destination_name: destination_name.into(),
            },
        }
    }

    /// Failure row; `message` is cut to [`MAX_ERROR_CHARS`] characters.
    pub fn failure(source_id: impl Into<String>, message: &str) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: Outcome::Failure {
                error: truncate_message(message),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn destination_name(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { destination_name } => Some(destination_name),
            Outcome::Failure { .. } => None,
        }
    }

    /// Second CSV column: the COG name, or `ERROR: <message>`.
    pub fn csv_cell(&self) -> String {
        match &self.outcome {
            Outcome::Success { destination_name } => destination_name.clone(),
            Outcome::Failure { error } => format!("{ERROR_CELL_PREFIX}{error}"),
        }
    }
}

/// Truncate on a character boundary.
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

/// Ordered outcomes of one batch run. Rows can be appended, never edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingLedger {
    records: Vec<ProcessingRecord>,
}

impl ProcessingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ProcessingRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ProcessingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ProcessingRecord> {
        self.records.iter().filter(|r| r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn first_success(&self) -> Option<&ProcessingRecord> {
        self.successes().next()
    }

    /// Render as `files_converted.csv`.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(CSV_HEADER.len() + 1 + self.records.len() * 64);
        out.push_str(CSV_HEADER);
        out.push('\n');
        for record in &self.records {
            out.push_str(&csv_field(&record.source_id));
            out.push(',');
            out.push_str(&csv_field(&record.csv_cell()));
            out.push('\n');
        }
        out
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_ledger(self)
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Counts derived from a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage with one decimal, or `N/A` for an empty ledger.
    pub success_rate: String,
    pub timestamp: String,
}

impl BatchSummary {
    pub fn from_ledger(ledger: &ProcessingLedger) -> Self {
        let total_files = ledger.len();
        let successful = ledger.success_count();
        Self {
            total_files,
            successful,
            failed: total_files - successful,
            success_rate: success_rate(successful, total_files),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn success_rate(successful: usize, total: usize) -> String {
    if total == 0 {
        return "N/A".to_string();
    }
    format!("{:.1}%", successful as f64 / total as f64 * 100.0)
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "BATCH PROCESSING SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total files processed: {}", self.total_files)?;
        writeln!(f, "Successful: {}", self.successful)?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Success rate: {}", self.success_rate)?;
        writeln!(f, "Timestamp: {}", self.timestamp)?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(150);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn csv_quotes_fields_with_commas_and_quotes() {
        let mut ledger = ProcessingLedger::new();
        ledger.append(ProcessingRecord::failure("a.tif", "bad \"header\", offset 3"));
        let csv = ledger.to_csv();
        assert_eq!(
            csv,
            "file_name,COGs_created\na.tif,\"ERROR: bad \"\"header\"\", offset 3\"\n"
        );
    }

    #[test]
    fn success_rate_formats_one_decimal() {
        assert_eq!(success_rate(1, 3), "33.3%");
        assert_eq!(success_rate(0, 0), "N/A");
        assert_eq!(success_rate(2, 2), "100.0%");
    }
}
