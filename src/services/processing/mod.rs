//! Spreadsheet import pipeline for photovoltaic shutdown-device measurements
//!
//! Files are parsed into header-keyed rows, normalized, partitioned into
//! fixed-size batches and written under one newly created experiment.

pub mod database;
pub mod import_pipeline;
pub mod row_processing;
pub mod structure;
pub mod template;
pub mod utils;

use chrono::{FixedOffset, Offset, Utc};
use row_processing::ParsePolicy;

/// Tunables for the import pipeline, loaded from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    /// Rows per insert statement
    pub batch_size: usize,
    /// Write every batch of a file inside one transaction
    pub atomic_files: bool,
    pub parse_policy: ParsePolicy,
    /// Offset for text timestamps written without one
    pub zone_offset: FixedOffset,
}

impl ImportSettings {
    pub const DEFAULT_BATCH_SIZE: usize = 100;
    /// Each row binds ten parameters; this keeps a batch well under the
    /// SQLite (32766) and PostgreSQL (65535) bind limits.
    pub const MAX_BATCH_SIZE: usize = 1000;

    pub fn clamp_batch_size(requested: usize) -> usize {
        requested.clamp(1, Self::MAX_BATCH_SIZE)
    }

    /// Batch size actually used for writes
    pub fn effective_batch_size(&self) -> usize {
        Self::clamp_batch_size(self.batch_size)
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            atomic_files: false,
            parse_policy: ParsePolicy::default(),
            zone_offset: Utc.fix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(100, 100)]
    #[case(1000, 1000)]
    #[case(5000, ImportSettings::MAX_BATCH_SIZE)]
    #[case(usize::MAX, ImportSettings::MAX_BATCH_SIZE)]
    fn test_batch_size_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(ImportSettings::clamp_batch_size(requested), expected);

        let settings = ImportSettings {
            batch_size: requested,
            ..ImportSettings::default()
        };
        assert_eq!(settings.effective_batch_size(), expected);
    }
}
