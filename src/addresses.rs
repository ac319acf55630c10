//! Case-insensitive operations over plain address lists.
//!
//! Comparison always happens on the trimmed, lowercased form; outputs keep
//! the casing of the list the element came from.

use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::AppResult;

fn key(address: &str) -> String {
    address.trim().to_lowercase()
}

fn key_set(list: &[String]) -> HashSet<String> {
    list.iter().map(|a| key(a)).collect()
}

/// Split into lines, trim, drop blanks and `//` comments.
pub fn parse_address_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(str::to_string)
        .collect()
}

/// Read an address list. Extra comma-separated columns and an `address`
/// header row are tolerated; only the first column is kept.
pub fn read_address_list<P: AsRef<Path>>(path: P) -> AppResult<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let lines = parse_address_list(&text).join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(lines.as_bytes());

    let mut addresses = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let Some(first) = record.get(0).filter(|field| !field.is_empty()) else {
            continue;
        };
        if row == 0 && first.eq_ignore_ascii_case("address") {
            continue;
        }
        addresses.push(first.to_string());
    }

    info!("Read {} addresses from {:?}", addresses.len(), path);
    Ok(addresses)
}

/// One address per line, no header, no trailing newline.
pub fn write_address_list<P: AsRef<Path>>(path: P, addresses: &[String]) -> AppResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, addresses.join("\n"))?;
    info!("Wrote {} addresses to {:?}", addresses.len(), path);
    Ok(())
}

/// Elements of `a` not present in `b`.
pub fn diff(a: &[String], b: &[String]) -> Vec<String> {
    let b_keys = key_set(b);
    a.iter().filter(|addr| !b_keys.contains(&key(addr))).cloned().collect()
}

/// Elements of `a` also present in `b`.
pub fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    let b_keys = key_set(b);
    a.iter().filter(|addr| b_keys.contains(&key(addr))).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListComparison {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub common: Vec<String>,
}

pub fn compare(a: &[String], b: &[String]) -> ListComparison {
    ListComparison {
        only_in_a: diff(a, b),
        only_in_b: diff(b, a),
        common: intersect(a, b),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    /// Normalized values seen more than once, in first-repeat order.
    pub duplicates: Vec<String>,
    /// Occurrences beyond the first, summed over all duplicated values.
    pub duplicate_entries: usize,
    pub total: usize,
    pub unique: usize,
    #[serde(skip)]
    counts: HashMap<String, usize>,
}

impl DuplicateReport {
    /// The `n` most repeated values with their counts, ties in first-repeat order.
    pub fn most_duplicated(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .duplicates
            .iter()
            .map(|addr| (addr.clone(), self.counts[addr]))
            .collect();
        ranked.sort_by(|x, y| y.1.cmp(&x.1));
        ranked.truncate(n);
        ranked
    }
}

pub fn find_duplicates(list: &[String]) -> DuplicateReport {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    let mut total = 0;

    for address in list {
        let normalized = key(address);
        if normalized.is_empty() {
            continue;
        }
        total += 1;
        let count = counts.entry(normalized.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(normalized);
        }
    }

    let duplicate_entries = counts.values().filter(|c| **c > 1).map(|c| c - 1).sum();

    DuplicateReport {
        duplicates,
        duplicate_entries,
        total,
        unique: counts.len(),
        counts,
    }
}

/// Keep the first occurrence of every address.
pub fn dedup(list: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    list.iter().filter(|addr| seen.insert(key(addr))).cloned().collect()
}
