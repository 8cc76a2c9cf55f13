//! Per-row placing series for charting.

use serde::{Deserialize, Serialize};

use crate::parse::{parse_parenthesized_int, split_lines};

/// Placing per checkpoint for one row; `None` where a cell has no placing.
///
/// Checkpoint cells start at `first_column`. The result is padded with `None`
/// up to `expected_len`; a longer row is kept whole.
pub fn build_series_from<S: AsRef<str>>(
    row: &[S],
    first_column: usize,
    expected_len: usize,
) -> Vec<Option<u32>> {
    let mut values: Vec<Option<u32>> = row
        .iter()
        .skip(first_column)
        .map(|cell| {
            let lines = split_lines(cell.as_ref());
            if lines.len() >= 2 {
                parse_parenthesized_int(lines[1])
            } else {
                None
            }
        })
        .collect();
    if values.len() < expected_len {
        values.resize(expected_len, None);
    }
    values
}

/// [`build_series_from`] with checkpoints starting at column 3.
pub fn build_series<S: AsRef<str>>(row: &[S], expected_len: usize) -> Vec<Option<u32>> {
    build_series_from(row, crate::FIRST_CHECKPOINT_COLUMN, expected_len)
}

/// Axis hints for drawing a series: 1-based x labels and a reversed y axis
/// (placing 1 on top).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartHints {
    pub x_labels: Vec<String>,
    pub y_suggested_max: u32,
    pub y_reversed: bool,
}

pub fn chart_hints(series: &[Option<u32>]) -> ChartHints {
    let y_suggested_max = series
        .iter()
        .flatten()
        .max()
        .map_or(20, |max| max.saturating_add(5));
    ChartHints {
        x_labels: (1..=series.len()).map(|i| i.to_string()).collect(),
        y_suggested_max,
        y_reversed: true,
    }
}

/// Label drawn above a chart point.
pub fn point_label(value: Option<u32>) -> String {
    value.map(|v| format!("P{v}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_expected_length() {
        let row = [
            "47",
            "Romanovas Marijus",
            "M40",
            "1:00<br>1:00 (12)",
            "2:10<br>1:10 (9)",
            "3:30<br>1:20",
        ];
        let series = build_series(&row, 5);
        assert_eq!(series, vec![Some(12), Some(9), None, None, None]);
    }

    #[test]
    fn single_line_cells_are_null() {
        let row = ["1", "x", "y", "(4)", "1:00\n0:30 ( 4 )"];
        assert_eq!(build_series(&row, 2), vec![None, Some(4)]);
    }

    #[test]
    fn longer_rows_are_not_truncated() {
        let row = ["1", "x", "y", "a<br>(1)", "b<br>(2)", "c<br>(3)"];
        assert_eq!(build_series(&row, 2).len(), 3);
    }

    #[test]
    fn metadata_only_row() {
        let row = ["1", "x"];
        assert_eq!(build_series(&row, 3), vec![None, None, None]);
    }

    #[test]
    fn hints_follow_values() {
        let hints = chart_hints(&[Some(3), None, Some(11)]);
        assert_eq!(hints.x_labels, vec!["1", "2", "3"]);
        assert_eq!(hints.y_suggested_max, 16);
        assert!(hints.y_reversed);
        assert_eq!(chart_hints(&[None, None]).y_suggested_max, 20);
        assert_eq!(point_label(Some(4)), "P4");
        assert_eq!(point_label(None), "");
    }
}
