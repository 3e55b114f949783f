//! Lot selection rules used when resolving reservations against a source
//! stockroom.
//!
//! All functions work on a slice of lots in canonical order and return indices
//! into it, so callers can run them against a scratch copy of the ledger.

use chrono::{DateTime, Utc};

use crate::stock::{BatchOrigin, Lot, LotQualifier};

/// Index of the lot with exactly this qualifier.
pub fn find_exact(lots: &[Lot], qualifier: &LotQualifier) -> Option<usize> {
    lots.iter().position(|l| l.qualifier == *qualifier)
}

/// Indices of every lot whose expiration equals `expiration`.
pub fn matching_expiration(lots: &[Lot], expiration: Option<DateTime<Utc>>) -> Vec<usize> {
    lots.iter()
        .enumerate()
        .filter(|(_, l)| l.qualifier.expiration == expiration)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of the lots whose expiration is closest to `date`.
///
/// Distance is signed (`expiration - date`), so a lot that has already expired
/// ranks ahead of one that has not. Lots without an expiration rank after every
/// dated lot; they are only returned when no lot carries an expiration.
pub fn closest_expiration(lots: &[Lot], date: DateTime<Utc>) -> Vec<usize> {
    let all: Vec<usize> = (0..lots.len()).collect();
    closest_expiration_in(lots, &all, date)
}

/// [`closest_expiration`] restricted to `candidates`.
pub fn closest_expiration_in(lots: &[Lot], candidates: &[usize], date: DateTime<Utc>) -> Vec<usize> {
    let best = candidates.iter().filter_map(|&i| seconds_until(&lots[i], date)).min();

    candidates
        .iter()
        .copied()
        .filter(|&i| seconds_until(&lots[i], date) == best)
        .collect()
}

/// Indices of every lot originating from `batch`.
pub fn matching_batch(lots: &[Lot], batch: Option<BatchOrigin>) -> Vec<usize> {
    lots.iter()
        .enumerate()
        .filter(|(_, l)| l.qualifier.batch == batch)
        .map(|(i, _)| i)
        .collect()
}

fn seconds_until(lot: &Lot, date: DateTime<Utc>) -> Option<i64> {
    lot.qualifier.expiration.map(|e| (e - date).num_seconds())
}

/// Index of the candidate whose originating operation is oldest.
///
/// Candidates without a dated origin are excluded from the comparison; ties
/// keep canonical lot order. When no candidate has a dated origin the first
/// candidate is returned.
pub fn oldest_batch(lots: &[Lot], candidates: &[usize]) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .filter_map(|i| {
            lots[i]
                .qualifier
                .batch
                .and_then(|b| b.operation_date)
                .map(|date| (date, i))
        })
        .min()
        .map(|(_, i)| i)
        .or_else(|| candidates.first().copied())
}
