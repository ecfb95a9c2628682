//! Course-management dataset: records, CSV reading and synthetic generation.

mod generate;
mod reader;
mod record;

pub use generate::{FIXED_PROFESSOR_ID, generate_records, write_csv};
pub use reader::{COLUMNS, read_records};
pub use record::{DatasetRecord, SubmissionStatus};

use std::path::Path;

use log::{info, warn};

use crate::core::BenchError;

/// Immutable, ordered rows; each tier loads a leading prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<DatasetRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<DatasetRecord>) -> Self {
        Self { records }
    }

    /// Reads at most `limit` rows from a CSV file.
    pub fn open(path: &Path, limit: Option<usize>) -> Result<Self, BenchError> {
        let records = read_records(path, limit)?;
        info!("read {} records from {}", records.len(), path.display());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    /// The first `tier_size` records, or all of them when the dataset is shorter.
    pub fn prefix(&self, tier_size: usize) -> &[DatasetRecord] {
        if tier_size > self.records.len() {
            warn!(
                "tier of {} records exceeds dataset size {}, loading all rows",
                tier_size,
                self.records.len()
            );
        }
        &self.records[..tier_size.min(self.records.len())]
    }
}
