//! Summary table of the portal report: item index to transaction code.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::extract::patterns::{CFOP_PREFIX, PURE_INTEGER, collapse_whitespace, normalize_label};

lazy_static! {
    static ref TABLE: Selector = Selector::parse("table").unwrap();
    static ref ROW: Selector = Selector::parse("tr").unwrap();
}

/// Text every qualifying table must contain (after label normalization).
const SUMMARY_KEYWORDS: [&str; 3] = ["INFORMACOES DETALHADAS", "OPERACAO", "CFOP"];

/// Column holding the transaction code.
const CODE_COLUMN: usize = 2;

/// Transaction codes keyed by item index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryTable {
    pub codes: BTreeMap<u32, String>,

    /// First code seen, used for items without a row of their own.
    pub default_code: Option<String>,
}

impl SummaryTable {
    /// Scan the document for the summary table. An absent table yields an empty map.
    pub fn extract(document: &Html) -> Self {
        let Some(table) = find_summary_table(document) else {
            info!("No transaction summary table found");
            return Self::default();
        };

        let own_rows = table.select(&ROW).filter(|row| owning_table(*row) == Some(table));
        let mut summary = Self::from_rows(own_rows);
        if summary.codes.is_empty() {
            // Grid nested below the titled table
            debug!("Summary table has no item rows of its own, reading nested rows");
            summary = Self::from_rows(table.select(&ROW));
        }

        info!(
            "Summary table: {} codes, default {:?}",
            summary.codes.len(),
            summary.default_code
        );
        summary
    }

    fn from_rows<'a>(rows: impl Iterator<Item = ElementRef<'a>>) -> Self {
        let mut summary = Self::default();
        for row in rows {
            let cells: Vec<ElementRef> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| c.value().name() == "td")
                .collect();
            if cells.len() <= CODE_COLUMN {
                continue;
            }

            let index_text = cell_text(cells[0]);
            if !PURE_INTEGER.is_match(&index_text) {
                continue;
            }
            let Ok(index) = index_text.parse::<u32>() else {
                continue;
            };
            let Some(code) = leading_code(&cell_text(cells[CODE_COLUMN])) else {
                debug!("Summary row {} has no transaction code", index);
                continue;
            };

            if summary.default_code.is_none() {
                summary.default_code = Some(code.clone());
            }
            summary.codes.entry(index).or_insert(code);
        }
        summary
    }

    /// Code for `index`, falling back to the default code.
    pub fn code_for(&self, index: u32) -> Option<&str> {
        self.codes
            .get(&index)
            .or(self.default_code.as_ref())
            .map(String::as_str)
    }
}

fn qualifies(table: ElementRef) -> bool {
    let text = normalize_label(&table.text().collect::<Vec<_>>().join(" "));
    SUMMARY_KEYWORDS.iter().all(|kw| text.contains(kw))
}

/// First qualifying table, narrowed to its innermost qualifying descendant.
fn find_summary_table(document: &Html) -> Option<ElementRef<'_>> {
    let mut table = document.select(&TABLE).find(|t| qualifies(*t))?;
    while let Some(inner) = table.select(&TABLE).find(|t| *t != table && qualifies(*t)) {
        table = inner;
    }
    Some(table)
}

fn owning_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
}

fn cell_text(cell: ElementRef) -> String {
    collapse_whitespace(&cell.text().collect::<String>())
}

/// Four-digit prefix, or the part before a dash for irregular codes.
fn leading_code(text: &str) -> Option<String> {
    if let Some(caps) = CFOP_PREFIX.captures(text) {
        return Some(caps[1].to_string());
    }
    text.split_once('-')
        .map(|(head, _)| head.trim())
        .filter(|head| !head.is_empty())
        .map(str::to_string)
}
