//! Total-time ranking and the rank annotation merged into cell text.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parse::{first_line, line_breaks, parse_duration};
use crate::segment::competition_ranks;
use crate::RankError;

/// Markup used when a rank is written into a cell.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnnotationStyle {
    /// Break inserted when the rank needs a line of its own.
    pub line_break: String,
    pub open: String,
    pub close: String,
}

impl AnnotationStyle {
    pub fn html() -> Self {
        Self {
            line_break: "<br />".to_string(),
            open: "<span style='font-weight:bold;color:#333'>".to_string(),
            close: "</span>".to_string(),
        }
    }

    pub fn plain() -> Self {
        Self {
            line_break: "\n".to_string(),
            open: "[".to_string(),
            close: "]".to_string(),
        }
    }

    pub fn render(&self, rank: u32) -> String {
        format!("{}{}{}", self.open, rank, self.close)
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::html()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TotalRank {
    pub rank: u32,
    pub merged_text: String,
}

/// Writes rank annotations into cell text and recognizes ones already there.
#[derive(Clone, Debug)]
pub struct RankAnnotator {
    style: AnnotationStyle,
    // group 1: the separating space of an appended annotation, group 2: rank
    pattern: Regex,
}

impl RankAnnotator {
    pub fn new(style: AnnotationStyle) -> Result<Self, RankError> {
        if style.open.is_empty() || style.close.is_empty() {
            return Err(RankError::InvalidParameter(
                "annotation open/close markers must not be empty".into(),
            ));
        }
        if line_breaks(&style.line_break) != [(0, style.line_break.len())] {
            return Err(RankError::InvalidParameter(format!(
                "annotation line break {:?} is not a recognized break marker",
                style.line_break
            )));
        }
        let pattern = Regex::new(&format!(
            "( ?){}(\\d+){}",
            regex::escape(&style.open),
            regex::escape(&style.close)
        ))
        .map_err(|e| RankError::InvalidParameter(e.to_string()))?;
        Ok(Self { style, pattern })
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Byte range of the line that may hold an annotation: the third line,
    /// or, with fewer than two breaks, a last line consisting of nothing but
    /// an annotation (what the fallback in [`merge`](Self::merge) writes).
    fn annotation_line(&self, text: &str) -> Option<(usize, usize)> {
        let breaks = line_breaks(text);
        if breaks.len() >= 2 {
            let end = breaks.get(2).map_or(text.len(), |b| b.0);
            return Some((breaks[1].1, end));
        }
        let start = breaks.last()?.1;
        let line = text[start..].trim();
        let whole = self.pattern.find(line)?;
        (whole.start() == 0 && whole.end() == line.len()).then_some((start, text.len()))
    }

    /// Rank carried by the first annotation on the annotation line, if any.
    pub fn existing_rank(&self, text: &str) -> Option<u32> {
        let (start, end) = self.annotation_line(text)?;
        self.pattern
            .captures(&text[start..end])
            .and_then(|caps| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Remove every annotation from the annotation line, including the space
    /// an appended one brought. Other lines are left alone.
    pub fn strip(&self, text: &str) -> String {
        let Some((start, end)) = self.annotation_line(text) else {
            return text.to_string();
        };
        format!(
            "{}{}{}",
            &text[..start],
            self.pattern.replace_all(&text[start..end], ""),
            &text[end..]
        )
    }

    /// Merge `rank` into the cell text.
    ///
    /// An annotation already on the annotation line is rewritten in place
    /// (extra copies are dropped), so merging twice leaves the text
    /// unchanged. Otherwise the rank goes on the third line: into it when
    /// that line is blank, appended after a space when it has content, or on
    /// a new line at the end when the cell has fewer than two breaks.
    pub fn merge(&self, text: &str, rank: u32) -> String {
        let rendered = self.style.render(rank);

        if let Some((start, end)) = self.annotation_line(text) {
            let line = &text[start..end];
            if self.pattern.is_match(line) {
                return format!(
                    "{}{}{}",
                    &text[..start],
                    self.rewrite(line, &rendered),
                    &text[end..]
                );
            }
        }

        let breaks = line_breaks(text);
        if breaks.len() < 2 {
            return format!("{}{}{}", text, self.style.line_break, rendered);
        }

        let third_start = breaks[1].1;
        let third_end = breaks.get(2).map_or(text.len(), |b| b.0);
        if text[third_start..third_end].trim().is_empty() {
            format!("{}{}{}", &text[..third_start], rendered, &text[third_start..])
        } else {
            format!("{} {}{}", &text[..third_end], rendered, &text[third_end..])
        }
    }

    fn rewrite(&self, line: &str, rendered: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        let mut written = false;
        for caps in self.pattern.captures_iter(line) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&line[last..whole.start()]);
            if !written {
                out.push_str(caps.get(1).map_or("", |m| m.as_str()));
                out.push_str(rendered);
                written = true;
            }
            last = whole.end();
        }
        out.push_str(&line[last..]);
        out
    }
}

impl Default for RankAnnotator {
    fn default() -> Self {
        // The built-in style always satisfies the constructor checks.
        Self::new(AnnotationStyle::html()).expect("default annotation style is valid")
    }
}

/// Competition ranks of parsed total times; every entry is ranked.
pub fn rank_total_times<K: Ord + Clone>(entries: &[(K, u32)]) -> BTreeMap<K, u32> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|(_, seconds)| *seconds);
    competition_ranks(&sorted)
        .map(|(key, rank)| (key.clone(), rank))
        .collect()
}

/// Text entry point: rank the totals on the first line of each cell and
/// merge each rank into its cell.
pub fn rank_totals<K, S>(column: &[(K, S)], annotator: &RankAnnotator) -> BTreeMap<K, TotalRank>
where
    K: Ord + Clone,
    S: AsRef<str>,
{
    let entries: Vec<(K, u32)> = column
        .iter()
        .filter_map(|(key, text)| parse_duration(first_line(text.as_ref())).map(|s| (key.clone(), s)))
        .collect();
    let ranks = rank_total_times(&entries);

    column
        .iter()
        .filter_map(|(key, text)| {
            let rank = *ranks.get(key)?;
            Some((
                key.clone(),
                TotalRank {
                    rank,
                    merged_text: annotator.merge(text.as_ref(), rank),
                },
            ))
        })
        .collect()
}
