//! Per-item blocks of the portal report.
//!
//! Each block starts at an `<h2>ITEM:n</h2>` heading. The heading's table row
//! carries labeled cells (`<h5>LABEL</h5> value`), and the rows after it carry
//! the free-text calculation lines.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

use crate::extract::patterns::{ITEM_HEADING, collapse_whitespace, normalize_label};

lazy_static! {
    static ref HEADING: Selector = Selector::parse("h2").unwrap();
}

/// Number of rows after the heading row that hold calculation lines.
const CALCULATION_ROWS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("heading {0:?} carries no item index")]
    MissingIndex(String),

    #[error("heading of item {0} is not inside a table cell")]
    NoContainer(u32),

    #[error("cell of item {0} is not inside a table row")]
    NoRow(u32),
}

/// One labeled value harvested from a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledValue {
    /// Normalized label text (uppercase, no accents, no trailing colon).
    pub label: String,

    /// Label text as written.
    pub raw_label: String,

    pub value: String,
}

/// Labels of one row, first occurrence of each label wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<LabeledValue>,

    /// Text of the first label-free cell carrying a currency amount.
    unlabeled_amount: Option<String>,
}

impl LabelMap {
    /// Harvest every labeled cell of `row`.
    pub fn from_row(row: ElementRef) -> Self {
        let mut map = Self::default();
        for cell in row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "td")
        {
            let mut tokens = Vec::new();
            walk_cell(cell, &mut tokens);

            if !tokens.iter().any(|t| matches!(t, Token::Label(_))) {
                let text = collapse_whitespace(&cell.text().collect::<String>());
                if text.contains("R$") && map.unlabeled_amount.is_none() {
                    map.unlabeled_amount = Some(text);
                }
                continue;
            }

            for entry in split_on_labels(tokens) {
                map.insert(entry);
            }
        }
        map
    }

    fn insert(&mut self, entry: LabeledValue) {
        if self.get(&entry.label).is_none() {
            self.entries.push(entry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Value of the label, exactly as normalized.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entry(label).map(|e| e.value.as_str())
    }

    pub fn entry(&self, label: &str) -> Option<&LabeledValue> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// First entry whose label starts with `prefix`.
    pub fn starting_with(&self, prefix: &str) -> Option<&LabeledValue> {
        self.entries.iter().find(|e| e.label.starts_with(prefix))
    }

    pub fn unlabeled_amount(&self) -> Option<&str> {
        self.unlabeled_amount.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Label(String),
    Text(String),
}

/// Flatten a cell into label and text tokens, in document order.
fn walk_cell(element: ElementRef, tokens: &mut Vec<Token>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => tokens.push(Token::Text(text.to_string())),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match child.value().name() {
                    "h5" => tokens.push(Token::Label(child.text().collect())),
                    "br" => tokens.push(Token::Text(" ".to_string())),
                    _ => {
                        walk_cell(child, tokens);
                        tokens.push(Token::Text(" ".to_string()));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Each label owns the text up to the next label or the end of the cell.
fn split_on_labels(tokens: Vec<Token>) -> Vec<LabeledValue> {
    let mut entries = Vec::new();
    let mut current: Option<String> = None;
    let mut buffer = String::new();

    for token in tokens {
        match token {
            Token::Label(raw) => {
                if let Some(label) = current.take() {
                    entries.push(labeled(label, &buffer));
                }
                buffer.clear();
                current = Some(raw);
            }
            Token::Text(text) => {
                // Text before the first label is not a value
                if current.is_some() {
                    buffer.push_str(&text);
                    buffer.push(' ');
                }
            }
        }
    }
    if let Some(label) = current {
        entries.push(labeled(label, &buffer));
    }
    entries
}

fn labeled(raw: String, value: &str) -> LabeledValue {
    let raw_label = collapse_whitespace(&raw);
    LabeledValue {
        label: normalize_label(raw_label.trim_end_matches(':')),
        raw_label,
        value: collapse_whitespace(value),
    }
}

/// A located item block, ready for field extraction.
#[derive(Debug, Clone)]
pub struct ItemBlock {
    pub index: u32,
    pub labels: LabelMap,

    /// Normalized text of the rows following the heading row.
    pub calculation_lines: Vec<String>,
}

/// Headings that open an item block, in document order.
pub fn item_headings(document: &Html) -> Vec<ElementRef<'_>> {
    document
        .select(&HEADING)
        .filter(|h| ITEM_HEADING.is_match(&heading_text(*h)))
        .collect()
}

fn heading_text(heading: ElementRef) -> String {
    collapse_whitespace(&heading.text().collect::<String>())
}

/// Read the block opened by `heading`.
pub fn read_block(heading: ElementRef) -> Result<ItemBlock, BlockError> {
    let text = heading_text(heading);
    let index = ITEM_HEADING
        .captures(&text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|index| *index > 0)
        .ok_or_else(|| BlockError::MissingIndex(text.clone()))?;

    let container = nearest_ancestor(heading, &["td", "th"]).ok_or(BlockError::NoContainer(index))?;
    let row = nearest_ancestor(container, &["tr"]).ok_or(BlockError::NoRow(index))?;

    let following: Vec<ElementRef> = row
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr")
        .take(CALCULATION_ROWS)
        .collect();

    let mut labels = LabelMap::from_row(row);
    if labels.is_empty() {
        // Alternate layout: labels sit one row below the heading
        if let Some(next) = following.first() {
            labels = LabelMap::from_row(*next);
        }
    }

    let calculation_lines = following
        .iter()
        .map(|r| normalize_label(&r.text().collect::<Vec<_>>().join(" ")))
        .collect();

    Ok(ItemBlock {
        index,
        labels,
        calculation_lines,
    })
}

fn nearest_ancestor<'a>(element: ElementRef<'a>, names: &[&str]) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| names.contains(&e.value().name()))
}
