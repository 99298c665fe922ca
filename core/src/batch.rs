//! Results of multi-row writes.
//!
//! # Design
//! Every attempted row gets its own `Result`. A tolerant batch attempts all
//! rows; a short-circuit batch stops after the first failed row and records
//! its position in `aborted_at`. Rows after that position are never sent,
//! so `rows` is shorter than the input.

use serde_json::Map;

use crate::error::Error;
use crate::types::Record;

/// Outcome of a single row: the record the service accepted, or why not.
pub type RowOutcome = Result<Record, Error>;

#[derive(Debug)]
pub struct BatchOutcome {
    /// Number of rows handed to the batch.
    pub requested: usize,
    /// One entry per attempted row, in input order.
    pub rows: Vec<RowOutcome>,
    /// Index of the row whose failure stopped a short-circuit batch.
    pub aborted_at: Option<usize>,
}

impl BatchOutcome {
    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    pub fn accepted(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// Collapses the outcome into one record per input row.
    ///
    /// An aborted batch fails with the error of the row that stopped it.
    /// Otherwise failed rows become empty records, and the result must be
    /// exactly as long as the input.
    pub fn into_records(self) -> Result<Vec<Record>, Error> {
        let requested = self.requested;
        let mut rows = self.rows;

        if let Some(index) = self.aborted_at {
            if index < rows.len() {
                if let Err(cause) = rows.swap_remove(index) {
                    return Err(cause);
                }
            }
            return Err(Error::LengthMismatch {
                requested,
                returned: index,
            });
        }

        let records: Vec<Record> = rows
            .into_iter()
            .map(|row| row.unwrap_or_else(|_| Map::new()))
            .collect();

        if records.len() != requested {
            return Err(Error::LengthMismatch {
                requested,
                returned: records.len(),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use serde_json::json;

    fn record(id: &str) -> Record {
        json!({ "id": id }).as_object().unwrap().clone()
    }

    fn failure() -> Error {
        Error::Service(ServiceError::Status {
            status: -1,
            message: "rejected".to_string(),
        })
    }

    #[test]
    fn tolerant_failures_become_empty_records() {
        let outcome = BatchOutcome {
            requested: 3,
            rows: vec![Ok(record("1")), Err(failure()), Ok(record("3"))],
            aborted_at: None,
        };
        assert_eq!(outcome.accepted().count(), 2);
        assert_eq!(outcome.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);

        let records = outcome.into_records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[1].is_empty());
        assert_eq!(records[2]["id"], json!("3"));
    }

    #[test]
    fn aborted_batch_fails_with_cause() {
        let outcome = BatchOutcome {
            requested: 4,
            rows: vec![Ok(record("1")), Err(failure())],
            aborted_at: Some(1),
        };
        assert!(outcome.is_aborted());
        let err = outcome.into_records().unwrap_err();
        assert!(matches!(err, Error::Service(ServiceError::Status { status: -1, .. })));
    }

    #[test]
    fn short_result_is_a_length_mismatch() {
        let outcome = BatchOutcome {
            requested: 2,
            rows: vec![Ok(record("1"))],
            aborted_at: None,
        };
        assert!(matches!(
            outcome.into_records().unwrap_err(),
            Error::LengthMismatch { requested: 2, returned: 1 }
        ));
    }
}
