//! Per-name summaries of a batch of transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Status, Transaction};

/// Summary of every transaction sharing one name within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: String,
    pub count: usize,
    pub min_start_time: DateTime<Utc>,
    pub max_end_time: DateTime<Utc>,
    /// Milliseconds.
    pub p50_duration: u64,
    pub p95_duration: u64,
    pub max_duration: u64,
    /// Share of failed transactions, in `[0, 1]`.
    pub failure_rate: f64,
}

/// Summarize a batch, one entry per transaction name, ordered by name.
pub fn aggregate(transactions: &[Transaction]) -> Vec<Aggregate> {
    let mut groups: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        groups.entry(tx.name.as_str()).or_default().push(tx);
    }

    groups
        .into_iter()
        .filter_map(|(name, group)| summarize(name, &group))
        .collect()
}

fn summarize(name: &str, group: &[&Transaction]) -> Option<Aggregate> {
    let min_start_time = group.iter().map(|tx| tx.start_time).min()?;
    let max_end_time = group
        .iter()
        .map(|tx| tx.end_time.unwrap_or(tx.start_time))
        .max()?;

    let mut durations: Vec<u64> = group.iter().map(|tx| tx.duration_ms()).collect();
    durations.sort_unstable();

    let failures = group
        .iter()
        .filter(|tx| tx.status == Some(Status::Failure))
        .count();

    Some(Aggregate {
        name: name.to_string(),
        count: group.len(),
        min_start_time,
        max_end_time,
        p50_duration: percentile(&durations, 50),
        p95_duration: percentile(&durations, 95),
        max_duration: durations.last().copied().unwrap_or(0),
        failure_rate: failures as f64 / group.len() as f64,
    })
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}
