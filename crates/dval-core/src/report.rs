//! Two-column tabular projection (value, standard error) of a result.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::errors::{DvalError, ErrorInfo};
use crate::result::ValuationResult;
use crate::status::Status;

/// One row of a [`ValueTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRow {
    /// Data index or name, depending on how the table was keyed.
    pub key: String,
    /// Estimated value.
    pub value: f64,
    /// Standard error of the estimate.
    pub stderr: f64,
}

/// Snapshot of a result in its current sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTable {
    /// Header of the value column; the error column is `{column}_stderr`.
    pub column: String,
    /// Whether rows are keyed by name rather than data index.
    pub keyed_by_name: bool,
    /// Status of the source result.
    pub status: Status,
    /// Rows in the source's sort order.
    pub rows: Vec<ValueRow>,
}

impl ValuationResult {
    /// Projects the result onto `(value, stderr)` rows following the sort order.
    ///
    /// `column` defaults to the algorithm tag when `None`.
    pub fn to_table(&self, column: Option<&str>, use_names: bool) -> ValueTable {
        let rows = self
            .iter()
            .map(|item| ValueRow {
                stderr: item.stderr().unwrap_or(0.0),
                key: if use_names {
                    item.name
                } else {
                    item.index.to_string()
                },
                value: item.value,
            })
            .collect();
        ValueTable {
            column: column.unwrap_or(self.algorithm()).to_string(),
            keyed_by_name: use_names,
            status: self.status(),
            rows,
        }
    }
}

fn report_error(err: impl ToString) -> DvalError {
    DvalError::Serde(ErrorInfo::new("dval_core.report", err.to_string()))
}

impl ValueTable {
    /// Writes a header line and one CSV record per row into `writer`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), DvalError> {
        let mut wtr = csv::Writer::from_writer(writer);
        let key_header = if self.keyed_by_name { "name" } else { "index" };
        wtr.write_record([
            key_header.to_string(),
            self.column.clone(),
            format!("{}_stderr", self.column),
        ])
        .map_err(report_error)?;
        for row in &self.rows {
            wtr.write_record([row.key.clone(), row.value.to_string(), row.stderr.to_string()])
                .map_err(report_error)?;
        }
        wtr.flush().map_err(report_error)
    }
}
