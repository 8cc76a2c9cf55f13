//! One full processing pass over a grid snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::Rgb;
use crate::deviation::deviation_color;
use crate::grid::{Cell, Grid};
use crate::parse::parse_int;
use crate::segment::{rank_segment_times, ColorBand};
use crate::series::build_series_from;
use crate::total::{rank_total_times, RankAnnotator};
use crate::{Config, RankError};

/// Results for one checkpoint column, keyed by row index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnReport {
    pub column: usize,
    /// 1-based checkpoint number.
    pub checkpoint: usize,
    pub segment_bands: BTreeMap<usize, ColorBand>,
    pub total_ranks: BTreeMap<usize, u32>,
    /// Cell text with the total rank merged in.
    pub merged_texts: BTreeMap<usize, String>,
    /// Ranks a previous pass left in the cells.
    pub previous_ranks: BTreeMap<usize, u32>,
}

impl ColumnReport {
    /// Rows whose total rank differs from the one already in the cell.
    pub fn changed_rows(&self) -> Vec<usize> {
        self.total_ranks
            .iter()
            .filter(|(row, rank)| self.previous_ranks.get(row) != Some(rank))
            .map(|(&row, _)| row)
            .collect()
    }
}

/// Deviation colors and placing series for one selected row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RowReport {
    pub row: usize,
    pub name: String,
    pub reference: Option<u32>,
    /// The row's cells with rank annotations removed.
    pub cells: Vec<String>,
    /// Keyed by grid column.
    pub deviation_colors: BTreeMap<usize, Rgb>,
    pub series: Vec<Option<u32>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PassReport {
    pub checkpoint_count: usize,
    pub columns: Vec<ColumnReport>,
    /// Columns excluded by the skip marker.
    pub skipped_columns: Vec<usize>,
    pub rows: Vec<RowReport>,
}

impl PassReport {
    /// Merged cell texts keyed by `(row, column)`, ready for [`Grid::with_cells`].
    pub fn merged_texts(&self) -> BTreeMap<(usize, usize), String> {
        self.columns
            .iter()
            .flat_map(|col| {
                col.merged_texts
                    .iter()
                    .map(move |(&row, text)| ((row, col.column), text.clone()))
            })
            .collect()
    }

    /// Segment bands keyed by `(row, column)`.
    pub fn segment_bands(&self) -> BTreeMap<(usize, usize), ColorBand> {
        self.columns
            .iter()
            .flat_map(|col| {
                col.segment_bands
                    .iter()
                    .map(move |(&row, band)| ((row, col.column), *band))
            })
            .collect()
    }
}

/// Validated configuration plus the compiled annotator.
#[derive(Clone, Debug)]
pub struct Pass {
    config: Config,
    annotator: RankAnnotator,
}

impl Pass {
    pub fn new(config: Config) -> Result<Self, RankError> {
        config.validate()?;
        let annotator = RankAnnotator::new(config.annotation.clone())?;
        Ok(Self { config, annotator })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn annotator(&self) -> &RankAnnotator {
        &self.annotator
    }

    fn is_skipped(&self, grid: &Grid, col: usize) -> bool {
        let marker = self.config.skip_marker.as_str();
        !marker.is_empty()
            && grid
                .column(col)
                .iter()
                .any(|(_, text)| text.contains(marker))
    }

    /// Rank every checkpoint column and collect deviation/series data for
    /// the `selected` rows (indices into `grid`; unknown indices are ignored).
    pub fn run(&self, grid: &Grid, selected: &[usize]) -> PassReport {
        let first = self.config.first_checkpoint_column;
        let cells: Vec<Vec<Cell>> = grid
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|text| Cell::parse(text, &self.annotator))
                    .collect()
            })
            .collect();

        let mut report = PassReport {
            checkpoint_count: grid.checkpoint_count(first),
            ..PassReport::default()
        };

        for col in first..grid.max_cols() {
            if self.is_skipped(grid, col) {
                debug!(column = col, "skip marker present; column not ranked");
                report.skipped_columns.push(col);
                continue;
            }
            if let Some(column) = self.rank_column(grid, &cells, col) {
                report.columns.push(column);
            } else {
                debug!(column = col, "no parseable times");
            }
        }

        report.rows = selected
            .iter()
            .filter_map(|&row| self.row_report(grid, &cells, row, report.checkpoint_count))
            .collect();

        debug!(
            columns = report.columns.len(),
            skipped = report.skipped_columns.len(),
            rows = report.rows.len(),
            "pass complete"
        );
        report
    }

    fn rank_column(&self, grid: &Grid, cells: &[Vec<Cell>], col: usize) -> Option<ColumnReport> {
        let mut segments = Vec::new();
        let mut totals = Vec::new();
        let mut previous_ranks = BTreeMap::new();
        for (row, row_cells) in cells.iter().enumerate() {
            let Some(cell) = row_cells.get(col) else {
                continue;
            };
            if let Some(seconds) = cell.segment_seconds {
                segments.push((row, seconds));
            }
            if let Some(seconds) = cell.total_seconds {
                totals.push((row, seconds));
            }
            if let Some(rank) = cell.existing_rank {
                previous_ranks.insert(row, rank);
            }
        }
        if segments.is_empty() && totals.is_empty() {
            return None;
        }

        let segment_bands = rank_segment_times(&segments);
        let total_ranks = rank_total_times(&totals);
        let merged_texts = total_ranks
            .iter()
            .filter_map(|(&row, &rank)| {
                let text = grid.cell(row, col)?;
                Some((row, self.annotator.merge(text, rank)))
            })
            .collect();

        let report = ColumnReport {
            column: col,
            checkpoint: col - self.config.first_checkpoint_column + 1,
            segment_bands,
            total_ranks,
            merged_texts,
            previous_ranks,
        };
        if !report.previous_ranks.is_empty() {
            debug!(
                column = col,
                changed = report.changed_rows().len(),
                "re-ranked previously annotated column"
            );
        }
        Some(report)
    }

    fn row_report(
        &self,
        grid: &Grid,
        cells: &[Vec<Cell>],
        row: usize,
        checkpoint_count: usize,
    ) -> Option<RowReport> {
        let texts = grid.row(row)?;
        let first = self.config.first_checkpoint_column;
        let reference = texts.first().and_then(|text| parse_int(text));
        let name = texts
            .get(1)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        let deviation_colors = cells[row]
            .iter()
            .enumerate()
            .skip(first)
            .filter_map(|(col, cell)| {
                deviation_color(reference, cell.secondary_value, &self.config.deviation)
                    .map(|color| (col, color))
            })
            .collect();

        Some(RowReport {
            row,
            name,
            reference,
            cells: texts.iter().map(|text| self.annotator.strip(text)).collect(),
            deviation_colors,
            series: build_series_from(texts, first, checkpoint_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::total::AnnotationStyle;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn grid() -> Grid {
        Grid::new(vec![
            row(&["40", "Romanovas Marijus", "M", "10:00<br>10:00 (44)", "21:00<br>11:00 (60)"]),
            row(&["3", "Ričkus Arnoldas", "M", "9:00<br>9:00 (3)", "20:00<br>11:00 (2)"]),
            row(&["1", "Dauderienė Živilė", "W", "9:00<br>9:00 (1)", "DNF"]),
        ])
    }

    #[test]
    fn ranks_and_bands_per_column() {
        let pass = Pass::new(Config::default()).unwrap();
        let report = pass.run(&grid(), &[]);
        assert_eq!(report.checkpoint_count, 2);
        assert_eq!(report.columns.len(), 2);

        let first = &report.columns[0];
        assert_eq!(first.checkpoint, 1);
        assert_eq!(first.total_ranks, BTreeMap::from([(0, 3), (1, 1), (2, 1)]));
        assert_eq!(first.segment_bands[&1], ColorBand::Green);
        assert_eq!(first.segment_bands[&2], ColorBand::Green);
        assert_eq!(first.segment_bands[&0], ColorBand::Orange);

        let second = &report.columns[1];
        assert!(!second.total_ranks.contains_key(&2));
        assert_eq!(second.segment_bands.len(), 2);
    }

    #[test]
    fn skip_marker_excludes_column() {
        let mut rows = grid().rows().to_vec();
        rows[0][4] = "Laikas".into();
        let report = Pass::new(Config::default()).unwrap().run(&Grid::new(rows), &[]);
        assert_eq!(report.skipped_columns, vec![4]);
        assert_eq!(report.columns.len(), 1);

        let config = Config {
            skip_marker: String::new(),
            ..Config::default()
        };
        let mut rows = grid().rows().to_vec();
        rows[0][4] = "Laikas".into();
        let report = Pass::new(config).unwrap().run(&Grid::new(rows), &[]);
        assert!(report.skipped_columns.is_empty());
    }

    #[test]
    fn selected_rows_get_deviation_and_series() {
        let pass = Pass::new(Config::default()).unwrap();
        let report = pass.run(&grid(), &[0, 7]);
        assert_eq!(report.rows.len(), 1);
        let first = &report.rows[0];
        assert_eq!(first.name, "Romanovas Marijus");
        assert_eq!(first.reference, Some(40));
        assert_eq!(first.deviation_colors[&3].to_hex(), "#fffcb6");
        assert_eq!(first.deviation_colors[&4].to_hex(), "#ff4b4b");
        assert_eq!(first.series, vec![Some(44), Some(60)]);
        assert_eq!(first.cells[3], "10:00<br>10:00 (44)");
    }

    #[test]
    fn rerun_reports_previous_ranks_and_strips_selected_rows() {
        let pass = Pass::new(Config::default()).unwrap();
        let snapshot = grid();
        let written = snapshot.with_cells(&pass.run(&snapshot, &[]).merged_texts());

        let mut rows = written.rows().to_vec();
        rows[2][3] = "9:30<br>9:30 (1)<br><span style='font-weight:bold;color:#333'>1</span>".into();
        let report = pass.run(&Grid::new(rows), &[2]);

        let first = &report.columns[0];
        assert_eq!(first.previous_ranks, BTreeMap::from([(0, 3), (1, 1), (2, 1)]));
        assert_eq!(first.total_ranks, BTreeMap::from([(0, 3), (1, 1), (2, 2)]));
        assert_eq!(first.changed_rows(), vec![2]);

        let row = &report.rows[0];
        assert_eq!(row.reference, Some(1));
        assert_eq!(row.cells[3], "9:30<br>9:30 (1)<br>");
    }

    #[test]
    fn second_pass_over_written_back_grid_is_stable() {
        let pass = Pass::new(Config {
            annotation: AnnotationStyle::plain(),
            ..Config::default()
        })
        .unwrap();
        let snapshot = grid();
        let once = snapshot.with_cells(&pass.run(&snapshot, &[]).merged_texts());
        let twice = once.with_cells(&pass.run(&once, &[]).merged_texts());
        assert_eq!(once, twice);
        assert_eq!(once.cell(0, 3), Some("10:00<br>10:00 (44)\n[3]"));
    }
}
