// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Column-aligned table parser
//!
//! Engine list commands print a header line followed by rows padded into
//! columns. Column boundaries come from the header: each expected header's
//! starting offset begins a column, which ends just before the next
//! header's offset; the last column runs to end of line. Offsets are
//! counted in characters, matching how the engine pads its output.
//!
//! The parser never guesses: a required header missing from the header line
//! is an error. Optional headers only contribute a column (and therefore a
//! boundary) when present.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableParseError {
    #[error("output is empty, expected a header line")]
    MissingHeaderLine,

    #[error("header '{header}' not found in header line '{line}'")]
    MissingHeader { header: String, line: String },
}

/// One parsed row, keyed by header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    values: HashMap<String, String>,
}

impl TableRow {
    pub fn get(&self, header: &str) -> &str {
        self.values.get(header).map(String::as_str).unwrap_or("")
    }

    pub fn take(&mut self, header: &str) -> String {
        self.values.remove(header).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Column {
    header: String,
    start: usize,
    end: Option<usize>,
}

/// Parse `output` into one row per non-blank data line
pub fn parse_table(
    output: &str,
    required: &[&str],
    optional: &[&str],
) -> Result<Vec<TableRow>, TableParseError> {
    let mut lines = output.lines().skip_while(|l| l.trim().is_empty());
    let header_line = lines.next().ok_or(TableParseError::MissingHeaderLine)?;
    let columns = locate_columns(header_line, required, optional)?;

    Ok(lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let chars: Vec<char> = line.chars().collect();
            let values = columns
                .iter()
                .map(|col| (col.header.clone(), slice(&chars, col.start, col.end)))
                .collect();
            TableRow { values }
        })
        .collect())
}

fn locate_columns(
    header_line: &str,
    required: &[&str],
    optional: &[&str],
) -> Result<Vec<Column>, TableParseError> {
    let header_chars: Vec<char> = header_line.chars().collect();
    let mut starts = Vec::with_capacity(required.len() + optional.len());
    for header in required {
        let start = find_header(&header_chars, header).ok_or_else(|| TableParseError::MissingHeader {
            header: header.to_string(),
            line: header_line.to_string(),
        })?;
        starts.push((start, header.to_string()));
    }
    for header in optional {
        if let Some(start) = find_header(&header_chars, header) {
            starts.push((start, header.to_string()));
        }
    }
    starts.sort_by_key(|(start, _)| *start);

    let next_starts: Vec<Option<usize>> = starts.iter().skip(1).map(|(s, _)| Some(*s)).chain(Some(None)).collect();
    Ok(starts
        .into_iter()
        .zip(next_starts)
        .map(|((start, header), end)| Column { header, start, end })
        .collect())
}

/// Offset of `header` as a whole word, so "NAME" is not found inside "NAMES"
fn find_header(line: &[char], header: &str) -> Option<usize> {
    let needle: Vec<char> = header.chars().collect();
    if needle.is_empty() || needle.len() > line.len() {
        return None;
    }
    (0..=line.len() - needle.len()).find(|&i| {
        line[i..i + needle.len()] == needle[..]
            && (i == 0 || line[i - 1].is_whitespace())
            && line.get(i + needle.len()).is_none_or(|c| c.is_whitespace())
    })
}

fn slice(chars: &[char], start: usize, end: Option<usize>) -> String {
    let end = end.unwrap_or(chars.len()).min(chars.len());
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect::<String>().trim().to_string()
}
