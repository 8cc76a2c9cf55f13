//! Checkpoint ranking and color derivation for race result grids.
//!
//! Rows are participants and columns are checkpoints. Each checkpoint cell
//! carries a cumulative total time, the segment time (optionally followed by
//! the segment placing in parentheses) and, after a previous pass, a rank
//! annotation. From a grid snapshot this crate derives:
//!
//! - color bands for the four fastest segment times per column ([`segment`]),
//! - competition ranks of total times merged into the cell text ([`total`]),
//! - deviation colors of segment placings against the row's overall placing
//!   ([`deviation`]) and the per-row placing series ([`series`]).
//!
//! Every operation returns values; nothing here mutates the caller's table.

pub mod color;
pub mod deviation;
pub mod grid;
pub mod parse;
pub mod pass;
pub mod segment;
pub mod series;
pub mod total;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use color::{lerp_hex, Rgb};
pub use deviation::{deviation_color, deviation_percent, DeviationScale};
pub use grid::{load_grid, Cell, Grid};
pub use parse::{
    after_first_line_break, first_line, parse_duration, parse_int, parse_parenthesized_int,
};
pub use pass::{ColumnReport, Pass, PassReport, RowReport};
pub use segment::{rank_segment_times, rank_segments, ColorBand};
pub use series::{build_series, build_series_from, chart_hints, point_label, ChartHints};
pub use total::{rank_total_times, rank_totals, AnnotationStyle, RankAnnotator, TotalRank};

/// Columns before this index hold row metadata (reference value, name, class).
pub const FIRST_CHECKPOINT_COLUMN: usize = 3;

#[derive(Error, Debug)]
pub enum RankError {
    #[error("unsupported grid format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to read CSV grid: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read JSON grid: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub first_checkpoint_column: usize,
    /// A column containing this text in any cell is not ranked; empty disables.
    pub skip_marker: String,
    pub annotation: AnnotationStyle,
    pub deviation: DeviationScale,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_checkpoint_column: FIRST_CHECKPOINT_COLUMN,
            skip_marker: "Laikas".to_string(),
            annotation: AnnotationStyle::default(),
            deviation: DeviationScale::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, RankError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RankError> {
        if self.first_checkpoint_column < 2 {
            return Err(RankError::InvalidParameter(format!(
                "first_checkpoint_column must leave room for the reference and name columns, got {}",
                self.first_checkpoint_column
            )));
        }
        self.deviation.validate()?;
        RankAnnotator::new(self.annotation.clone())?;
        Ok(())
    }
}
