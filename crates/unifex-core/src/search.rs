//! Text search over extracted pages.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::models::{Document, Page, TextBlock};

/// What to look for: a literal substring or a regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self::Regex(re)
    }
}

impl Pattern {
    /// Compile to a matcher. `case_sensitive` is ignored for a prebuilt
    /// regex.
    fn compile(&self, case_sensitive: bool) -> Option<Regex> {
        match self {
            Self::Regex(re) => Some(re.clone()),
            Self::Literal(s) => RegexBuilder::new(&regex::escape(s))
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| tracing::warn!(error = %e, "search pattern too large"))
                .ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Pages to search; `None` searches all.
    pub pages: Option<Vec<usize>>,
    /// Merge horizontally adjacent blocks closer than this before matching.
    pub merge_gap: Option<f64>,
    /// Vertical bucket size used to group blocks into lines when merging.
    pub line_gap: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            pages: None,
            merge_gap: None,
            line_gap: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub page: usize,
    /// The matching block, possibly merged from several originals.
    pub block: TextBlock,
    pub original_blocks: Vec<TextBlock>,
}

fn merge_group(group: &[&TextBlock]) -> TextBlock {
    if let [single] = group {
        return (*single).clone();
    }
    let first = group[0];
    let bbox = group[1..].iter().fold(first.bbox, |acc, b| acc.union(&b.bbox));
    let text = group.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join(" ");
    TextBlock {
        text,
        bbox,
        rotation: first.rotation,
        confidence: None,
        font_info: None,
    }
}

/// Merge blocks on one line whose horizontal gap is at most `gap`.
fn merge_line(line: &[&TextBlock], gap: f64) -> Vec<TextBlock> {
    let mut merged = Vec::new();
    let mut group: Vec<&TextBlock> = Vec::new();
    for &block in line {
        if let Some(prev) = group.last()
            && block.bbox.x0 - prev.bbox.x1 > gap
        {
            merged.push(merge_group(&group));
            group.clear();
        }
        group.push(block);
    }
    if !group.is_empty() {
        merged.push(merge_group(&group));
    }
    merged
}

fn overlaps_horizontally(a: &TextBlock, b: &TextBlock) -> bool {
    !(a.bbox.x1 < b.bbox.x0 || a.bbox.x0 > b.bbox.x1)
}

fn search_blocks(
    blocks: &[TextBlock],
    matcher: &Regex,
    merge_gap: Option<f64>,
    line_gap: f64,
) -> Vec<(TextBlock, Vec<TextBlock>)> {
    let Some(gap) = merge_gap else {
        return blocks
            .iter()
            .filter(|b| matcher.is_match(&b.text))
            .map(|b| (b.clone(), vec![b.clone()]))
            .collect();
    };

    let mut lines: BTreeMap<i64, Vec<&TextBlock>> = BTreeMap::new();
    for block in blocks {
        let key = if line_gap > 0.0 {
            (block.bbox.y0 / line_gap).floor() as i64
        } else {
            0
        };
        lines.entry(key).or_default().push(block);
    }

    let mut results = Vec::new();
    for mut line in lines.into_values() {
        line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        for merged in merge_line(&line, gap) {
            if matcher.is_match(&merged.text) {
                let originals = line
                    .iter()
                    .filter(|b| overlaps_horizontally(b, &merged))
                    .map(|b| (*b).clone())
                    .collect();
                results.push((merged, originals));
            }
        }
    }
    results
}

impl Page {
    /// Blocks whose text matches `pattern`.
    pub fn search(&self, pattern: impl Into<Pattern>, case_sensitive: bool) -> Vec<&TextBlock> {
        let Some(matcher) = pattern.into().compile(case_sensitive) else {
            return Vec::new();
        };
        self.texts.iter().filter(|b| matcher.is_match(&b.text)).collect()
    }
}

impl Document {
    /// Search every selected page, in page order.
    pub fn search(&self, pattern: impl Into<Pattern>, options: &SearchOptions) -> Vec<SearchResult> {
        let Some(matcher) = pattern.into().compile(options.case_sensitive) else {
            return Vec::new();
        };
        let wanted: Option<BTreeSet<usize>> = options.pages.as_ref().map(|p| p.iter().copied().collect());

        let mut results = Vec::new();
        for page in &self.pages {
            if let Some(wanted) = &wanted
                && !wanted.contains(&page.page)
            {
                continue;
            }
            for (block, original_blocks) in
                search_blocks(&page.texts, &matcher, options.merge_gap, options.line_gap)
            {
                results.push(SearchResult {
                    page: page.page,
                    block,
                    original_blocks,
                });
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BBox, CoordinateInfo, CoordinateUnit};

    fn word(text: &str, x0: f64, y0: f64, x1: f64) -> TextBlock {
        TextBlock::new(text, BBox::new(x0, y0, x1, y0 + 10.0, CoordinateUnit::Pixels)).with_confidence(0.9)
    }

    fn page(index: usize, texts: Vec<TextBlock>) -> Page {
        let mut p = Page::new(
            index,
            1000.0,
            1000.0,
            CoordinateInfo {
                unit: CoordinateUnit::Pixels,
                dpi: None,
            },
        );
        p.texts = texts;
        p
    }

    fn doc(pages: Vec<Page>) -> Document {
        Document {
            path: "scan.png".into(),
            pages,
            metadata: None,
        }
    }

    #[test]
    fn test_page_search_literal_and_case() {
        let p = page(0, vec![word("Invoice", 0.0, 0.0, 50.0), word("total", 60.0, 0.0, 90.0)]);
        assert_eq!(p.search("invoice", true).len(), 0);
        assert_eq!(p.search("invoice", false).len(), 1);
        assert_eq!(p.search("a.", true).len(), 0);
    }

    #[test]
    fn test_regex_pattern() {
        let p = page(0, vec![word("2024-01-31", 0.0, 0.0, 50.0), word("n/a", 60.0, 0.0, 90.0)]);
        let re = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
        let hits = p.search(re, true);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "2024-01-31");
    }

    #[test]
    fn test_merge_gap_finds_phrases_across_words() {
        let d = doc(vec![page(
            0,
            vec![
                word("Amount", 100.0, 201.0, 150.0),
                word("Total", 40.0, 200.0, 95.0),
                word("Due", 400.0, 200.0, 430.0),
            ],
        )]);
        assert!(d.search("Total Amount", &SearchOptions::default()).is_empty());

        let opts = SearchOptions {
            merge_gap: Some(10.0),
            ..SearchOptions::default()
        };
        let hits = d.search("Total Amount", &opts);
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.block.text, "Total Amount");
        assert_eq!((hit.block.bbox.x0, hit.block.bbox.x1), (40.0, 150.0));
        assert!(hit.block.confidence.is_none());
        let originals: Vec<&str> = hit.original_blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(originals, vec!["Total", "Amount"]);
    }

    #[test]
    fn test_page_filter() {
        let d = doc(vec![
            page(0, vec![word("alpha", 0.0, 0.0, 10.0)]),
            page(1, vec![word("alpha", 0.0, 0.0, 10.0)]),
        ]);
        let opts = SearchOptions {
            pages: Some(vec![1]),
            ..SearchOptions::default()
        };
        let hits = d.search("alpha", &opts);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, 1);
    }
}
