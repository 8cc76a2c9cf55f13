//! Color bands for the fastest segment times of a checkpoint column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::parse::{after_first_line_break, parse_duration};

/// One of the four highlight classes, fastest first.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColorBand {
    Green,
    Yellow,
    Orange,
    Red,
}

impl ColorBand {
    pub const ALL: [ColorBand; 4] = [
        ColorBand::Green,
        ColorBand::Yellow,
        ColorBand::Orange,
        ColorBand::Red,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn color(self) -> Rgb {
        match self {
            ColorBand::Green => Rgb::new(0xb6, 0xfc, 0xb6),
            ColorBand::Yellow => Rgb::new(0xff, 0xfc, 0xb6),
            ColorBand::Orange => Rgb::new(0xff, 0xd5, 0x9e),
            ColorBand::Red => Rgb::new(0xff, 0xb6, 0xb6),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorBand::Green => "green",
            ColorBand::Yellow => "yellow",
            ColorBand::Orange => "orange",
            ColorBand::Red => "red",
        }
    }
}

/// Competition ranks over entries already sorted ascending by value.
///
/// The position counter advances for every entry, so a tie keeps the rank of
/// the first entry with that value and the next distinct value gets
/// `1 + number of entries before it`.
pub(crate) fn competition_ranks<K>(sorted: &[(K, u32)]) -> impl Iterator<Item = (&K, u32)> + '_ {
    let mut last: Option<u32> = None;
    let mut rank = 0u32;
    sorted.iter().enumerate().map(move |(idx, (key, value))| {
        if last.map_or(true, |prev| *value > prev) {
            rank = idx as u32 + 1;
        }
        last = Some(*value);
        (key, rank)
    })
}

/// Assign color bands to parsed segment times of one column.
///
/// Entries are sorted ascending (stable for equal times). Only ranks 1 to 4
/// receive a band; a tie consumes a slot, so `[30, 30, 32]` colors the third
/// entry orange, not yellow.
pub fn rank_segment_times<K: Ord + Clone>(entries: &[(K, u32)]) -> BTreeMap<K, ColorBand> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|(_, seconds)| *seconds);

    let mut out = BTreeMap::new();
    for (key, rank) in competition_ranks(&sorted) {
        let Some(band) = ColorBand::from_index(rank as usize - 1) else {
            break;
        };
        out.insert(key.clone(), band);
    }
    out
}

/// Text entry point: parse the segment time after the first line break of
/// each cell and band the column. Cells without a segment time are left out.
pub fn rank_segments<K, S>(column: &[(K, S)]) -> BTreeMap<K, ColorBand>
where
    K: Ord + Clone,
    S: AsRef<str>,
{
    let entries: Vec<(K, u32)> = column
        .iter()
        .filter_map(|(key, text)| {
            parse_duration(after_first_line_break(text.as_ref())).map(|s| (key.clone(), s))
        })
        .collect();
    rank_segment_times(&entries)
}
