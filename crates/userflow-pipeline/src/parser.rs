//! Tabular user payload parser
//!
//! Payloads are comma-separated text with one header row followed by
//! `id,name,email` rows. The first line is the header and is discarded
//! without being inspected, even when it is blank.
//! Fields are trimmed, quoted fields may contain commas, columns past the
//! third are ignored, and blank lines are skipped.
//!
//! A row is malformed when it has fewer than three fields or an empty id.
//! What happens to a malformed row is decided by [`MalformedRowPolicy`].

use crate::config::MalformedRowPolicy;
use thiserror::Error;
use tracing::{debug, warn};
use userflow_common::UserRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("payload is empty, expected a header row")]
    MissingHeader,

    #[error("line {line}: expected 3 fields (id, name, email), found {found}")]
    TooFewFields { line: u64, found: usize },

    #[error("line {line}: id field is empty")]
    EmptyId { line: u64 },

    #[error("line {line}: {message}")]
    Malformed { line: u64, message: String },
}

/// Records parsed from one payload plus the rows that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub records: Vec<UserRecord>,
    pub skipped: Vec<ParseError>,
}

/// Parse a tabular payload into normalized records.
///
/// With [`MalformedRowPolicy::FailBatch`] the first malformed row is
/// returned as the error; with [`MalformedRowPolicy::SkipRow`] it is logged
/// and recorded in [`ParsedBatch::skipped`]. A payload without a header row
/// is always an error.
pub fn parse_users(payload: &str, policy: MalformedRowPolicy) -> Result<ParsedBatch, ParseError> {
    if payload.trim().is_empty() {
        return Err(ParseError::MissingHeader);
    }

    // The reader skips blank lines, so the header is split off here.
    let body = payload.split_once('\n').map_or("", |(_, rest)| rest);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut batch = ParsedBatch::default();

    for (index, result) in reader.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map_or(index as u64 + 1, |p| p.line()) + 1;
                reject(
                    &mut batch,
                    policy,
                    ParseError::Malformed {
                        line,
                        message: e.to_string(),
                    },
                )?;
                continue;
            }
        };

        let line = row.position().map_or(index as u64 + 1, |p| p.line()) + 1;

        // Whitespace-only lines survive the reader as a single empty field.
        if row.len() == 1 && row.get(0).is_some_and(str::is_empty) {
            continue;
        }

        if row.len() < 3 {
            reject(
                &mut batch,
                policy,
                ParseError::TooFewFields {
                    line,
                    found: row.len(),
                },
            )?;
            continue;
        }

        let id = row.get(0).unwrap_or_default();
        if id.is_empty() {
            reject(&mut batch, policy, ParseError::EmptyId { line })?;
            continue;
        }

        batch.records.push(
            UserRecord::new(
                id,
                row.get(1).unwrap_or_default(),
                row.get(2).unwrap_or_default(),
            )
            .normalized(),
        );
    }

    debug!(
        "Parsed {} records ({} rows skipped)",
        batch.records.len(),
        batch.skipped.len()
    );

    Ok(batch)
}

fn reject(
    batch: &mut ParsedBatch,
    policy: MalformedRowPolicy,
    error: ParseError,
) -> Result<(), ParseError> {
    match policy {
        MalformedRowPolicy::FailBatch => Err(error),
        MalformedRowPolicy::SkipRow => {
            warn!("Skipping malformed row: {}", error);
            batch.skipped.push(error);
            Ok(())
        }
    }
}
