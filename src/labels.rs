//! Thresholding of class probabilities and class index to name lookup.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::ArrayView2;

use crate::{Result, TagError};

pub const DEFAULT_THRESHOLD: f32 = 0.2;
pub const DEFAULT_LABEL_COLUMN: &str = "display_name";

/// Active class indices per block, keyed by block index.
pub type BlockLabels<T> = BTreeMap<usize, Vec<T>>;

/// Classes with probability strictly above `threshold`, ascending, for every block.
///
/// Blocks with no active class still get an (empty) entry.
pub fn extract_labels(probabilities: ArrayView2<f32>, threshold: f32) -> BlockLabels<usize> {
    let labels: BlockLabels<usize> = probabilities
        .rows()
        .into_iter()
        .enumerate()
        .map(|(block, row)| {
            let active = row
                .iter()
                .enumerate()
                .filter(|&(_, &p)| p > threshold)
                .map(|(class, _)| class)
                .collect();
            (block, active)
        })
        .collect();

    tracing::debug!(
        "{} active labels over {} blocks at threshold {}",
        labels.values().map(Vec::len).sum::<usize>(),
        labels.len(),
        threshold
    );
    labels
}

/// One text column of a class table, row `i` naming class `i`.
#[derive(Debug, Clone)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Read `column` from a CSV file with a header row, e.g. AudioSet's
    /// `class_labels_indices.csv` (`index,mid,display_name`).
    pub fn from_csv<P: AsRef<Path>>(path: P, column: &str) -> Result<Self> {
        let path = path.as_ref();
        let table_err = |reason: String| TagError::LabelTable {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| table_err(e.to_string()))?;
        let mut records = parse_records(&text).into_iter();

        let header = records
            .next()
            .ok_or_else(|| table_err("empty file".into()))?;
        let col = header
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| table_err(format!("no column named {column:?}")))?;

        let mut names = Vec::new();
        for (row, fields) in records.enumerate() {
            let name = fields
                .into_iter()
                .nth(col)
                .ok_or_else(|| table_err(format!("row {row} has no field {col}")))?;
            names.push(name);
        }

        tracing::debug!("loaded {} labels from {}", names.len(), path.display());
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(TagError::LabelLookup {
                index,
                rows: self.names.len(),
            })
    }
}

/// Split CSV text into records, honouring double-quoted fields, `""` escapes
/// and line breaks inside quotes. Blank lines are skipped.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            '\r' if !quoted => {}
            '\n' if !quoted => {
                fields.push(std::mem::take(&mut field));
                let record = std::mem::take(&mut fields);
                if !is_blank(&record) {
                    records.push(record);
                }
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    if !is_blank(&fields) {
        records.push(fields);
    }
    records
}

fn is_blank(record: &[String]) -> bool {
    record.len() == 1 && record[0].trim().is_empty()
}

/// Replace every class index by its name; fails on the first unknown index.
pub fn resolve_names(
    table: &LabelTable,
    labels: &BlockLabels<usize>,
) -> Result<BlockLabels<String>> {
    labels
        .iter()
        .map(|(&block, classes)| {
            let names = classes
                .iter()
                .map(|&class| table.name(class).map(str::to_owned))
                .collect::<Result<Vec<_>>>()?;
            Ok((block, names))
        })
        .collect()
}
