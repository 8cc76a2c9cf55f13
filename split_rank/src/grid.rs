//! Immutable snapshot of a results table and the structured view of its cells.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::parse::{
    after_first_line_break, first_line, parse_duration, parse_parenthesized_int, split_lines,
};
use crate::total::RankAnnotator;
use crate::RankError;

/// Rows × columns of raw cell text, as captured at the start of a pass.
///
/// Rows may have different lengths.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of the widest row.
    pub fn max_cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Number of checkpoint columns when checkpoints start at `first_column`.
    pub fn checkpoint_count(&self, first_column: usize) -> usize {
        self.max_cols().saturating_sub(first_column)
    }

    /// `(row index, text)` for every row that has a cell in `col`.
    pub fn column(&self, col: usize) -> Vec<(usize, &str)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| row.get(col).map(|text| (idx, text.as_str())))
            .collect()
    }

    /// New grid holding only the given rows, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Grid {
        Grid::new(
            indices
                .iter()
                .filter_map(|&idx| self.rows.get(idx).cloned())
                .collect(),
        )
    }

    /// Copy of the grid with `(row, col)` texts replaced; out-of-range keys
    /// are ignored.
    pub fn with_cells(&self, replacements: &BTreeMap<(usize, usize), String>) -> Grid {
        let mut rows = self.rows.clone();
        for (&(row, col), text) in replacements {
            if let Some(cell) = rows.get_mut(row).and_then(|r| r.get_mut(col)) {
                cell.clone_from(text);
            }
        }
        Grid::new(rows)
    }

    /// Read a header-less CSV where every record is one row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RankError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { rows })
    }

    /// Read a JSON array of string arrays.
    pub fn from_json_str(text: &str) -> Result<Self, RankError> {
        Ok(Self {
            rows: serde_json::from_str(text)?,
        })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), RankError> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);
        for row in &self.rows {
            csv.write_record(row)?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// Decode a grid using the format hint (an extension or file name).
pub fn load_grid(input: &[u8], format: &str) -> Result<Grid, RankError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".csv") || format_lc == "csv" {
        Grid::from_csv_reader(input)
    } else if format_lc.ends_with(".json") || format_lc == "json" {
        let text = std::str::from_utf8(input)
            .map_err(|e| RankError::UnsupportedFormat(format!("{format}: {e}")))?;
        Grid::from_json_str(text)
    } else {
        Err(RankError::UnsupportedFormat(format.to_string()))
    }
}

/// The logical fields of one cell, parsed once per pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub total_seconds: Option<u32>,
    pub segment_seconds: Option<u32>,
    pub secondary_value: Option<u32>,
    /// Rank written by a previous pass, as recognized by the annotator.
    pub existing_rank: Option<u32>,
}

impl Cell {
    pub fn parse(text: &str, annotator: &RankAnnotator) -> Self {
        let lines = split_lines(text);
        Self {
            total_seconds: parse_duration(first_line(text)),
            segment_seconds: parse_duration(after_first_line_break(text)),
            secondary_value: lines.get(1).and_then(|line| parse_parenthesized_int(line)),
            existing_rank: annotator.existing_rank(text),
        }
    }
}
