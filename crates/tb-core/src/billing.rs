//! Billing policy engine.
//!
//! A pure function of a project's billing scheme, its time entries, and an
//! optional qualifying window. Hourly amounts are kept at full precision;
//! rounding happens at presentation boundaries. Fixed-fee shares are
//! quantized to the requested precision with the last qualifying entry
//! absorbing the rounding remainder, so shares always sum to the fee
//! exactly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::TimeEntry;
use crate::money::round_money;
use crate::project::BillingScheme;
use crate::types::EntryId;

const SECS_PER_HOUR: i64 = 3600;

/// Fixed-fee allocation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Proportional allocation over entries whose durations sum to zero.
    #[error("cannot allocate proportionally: total duration of {entries} qualifying entries is zero")]
    ZeroTotalDuration { entries: usize },
}

/// How a fixed fee is distributed across time entries for reporting.
///
/// Extension point for new strategies: add a variant and an arm in
/// [`FixedAllocation::allocate`]; engine call sites stay untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixedAllocation {
    /// The fee belongs to the project as a whole; no per-entry amounts.
    None,
    /// The fee is split evenly across qualifying entries.
    Equal,
    /// Each entry's share follows its fraction of the total duration.
    ProportionalToDuration,
}

impl FixedAllocation {
    /// Computes each qualifying entry's share of `amount`.
    ///
    /// `durations` holds the qualifying entries' durations in seconds, in
    /// report order. Returns one element per entry; `None` when the
    /// strategy defines no per-entry amount.
    fn allocate(
        self,
        amount: Decimal,
        durations: &[i64],
        precision: u32,
    ) -> Result<Vec<Option<Decimal>>, AllocationError> {
        let n = durations.len();
        match self {
            Self::None => Ok(vec![None; n]),
            Self::Equal => Ok(split_with_remainder(
                amount,
                durations.iter().map(|_| Decimal::ONE).collect(),
                precision,
            )),
            Self::ProportionalToDuration => {
                if n == 0 {
                    return Ok(Vec::new());
                }
                let total: i64 = durations.iter().sum();
                if total == 0 {
                    return Err(AllocationError::ZeroTotalDuration { entries: n });
                }
                Ok(split_with_remainder(
                    amount,
                    durations.iter().map(|&d| Decimal::from(d)).collect(),
                    precision,
                ))
            }
        }
    }
}

/// Splits `amount` across weighted shares quantized to `precision`.
///
/// All but the last share are rounded individually; the last share is the
/// exact remainder, so the shares sum to `amount` with no lost cents.
fn split_with_remainder(
    amount: Decimal,
    weights: Vec<Decimal>,
    precision: u32,
) -> Vec<Option<Decimal>> {
    let total: Decimal = weights.iter().sum();
    if weights.is_empty() || total.is_zero() {
        return Vec::new();
    }
    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        let share = if i + 1 == weights.len() {
            amount - allocated
        } else {
            round_money(amount * weight / total, precision)
        };
        allocated += share;
        shares.push(Some(share));
    }
    shares
}

/// The date range qualifying entries for a billing computation.
///
/// Half-open: `[start, end)`. Entries qualify by interval overlap and are
/// included in full — no proration of boundary-spanning entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingWindow {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether the interval `[start_at, end_at)` overlaps this window.
    #[must_use]
    pub fn admits(&self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> bool {
        if start_at == end_at {
            // Zero-length entries qualify by their instant alone.
            return self.start <= start_at && start_at < self.end;
        }
        start_at < self.end && end_at > self.start
    }
}

/// Billed amount for a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingLine {
    pub entry_id: EntryId,
    /// Full-precision amount in the project currency; `None` when the
    /// scheme defines no per-entry amount (fixed fee, no allocation).
    pub amount: Option<Decimal>,
    /// Whether the amount is already collected (the entry is paid).
    pub collected: bool,
    pub duration_secs: i64,
}

/// Result of a billing computation over one project's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReport {
    pub lines: Vec<BillingLine>,
    /// Aggregate billable amount in the project currency, full precision.
    pub total: Decimal,
    /// Portion of `total` on already-paid entries. Schemes without
    /// per-entry amounts attribute nothing here.
    pub collected: Decimal,
    /// `total - collected`.
    pub outstanding: Decimal,
    /// Running entries excluded from the computation.
    pub in_progress: usize,
}

/// Computes per-entry billed amounts and the aggregate for one project.
///
/// Running entries have no billable amount: they are excluded from lines
/// and totals and reported via [`BillingReport::in_progress`]. `precision`
/// quantizes fixed-fee shares; hourly amounts stay at full precision.
pub fn compute_billing(
    scheme: &BillingScheme,
    entries: &[TimeEntry],
    window: Option<&BillingWindow>,
    precision: u32,
) -> Result<BillingReport, AllocationError> {
    let mut in_progress = 0;
    let mut qualifying: Vec<&TimeEntry> = Vec::new();
    for entry in entries {
        let Some(end_at) = entry.end_at() else {
            in_progress += 1;
            continue;
        };
        if window.is_none_or(|w| w.admits(entry.start_at, end_at)) {
            qualifying.push(entry);
        }
    }
    if in_progress > 0 {
        tracing::debug!(in_progress, "running entries excluded from billing");
    }

    let amounts: Vec<Option<Decimal>> = match *scheme {
        BillingScheme::Hourly { rate } => qualifying
            .iter()
            .map(|entry| {
                Some(Decimal::from(entry.duration_secs()) / Decimal::from(SECS_PER_HOUR) * rate)
            })
            .collect(),
        BillingScheme::Fixed { amount, allocation } => {
            let durations: Vec<i64> = qualifying.iter().map(|e| e.duration_secs()).collect();
            allocation.allocate(amount, &durations, precision)?
        }
    };

    let lines: Vec<BillingLine> = qualifying
        .iter()
        .zip(amounts)
        .map(|(entry, amount)| BillingLine {
            entry_id: entry.id.clone(),
            amount,
            collected: entry.is_paid(),
            duration_secs: entry.duration_secs(),
        })
        .collect();

    let total = match *scheme {
        // The fee is owed in full no matter how many entries qualify.
        BillingScheme::Fixed { amount, .. } => amount,
        BillingScheme::Hourly { .. } => lines.iter().filter_map(|l| l.amount).sum(),
    };
    let collected: Decimal = lines
        .iter()
        .filter(|l| l.collected)
        .filter_map(|l| l.amount)
        .sum();

    Ok(BillingReport {
        total,
        collected,
        outstanding: total - collected,
        in_progress,
        lines,
    })
}
