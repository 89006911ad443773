//! # Request Queues
//!
//! FIFO queues of pending deposit and redemption requests.
//!
//! Every submission gets a sequence number from one strictly increasing
//! counter, and each queue is kept in submission order. Settlement and
//! cancellation both walk a queue from the head, so within a kind the oldest
//! request is always considered first. There is no ordering between the
//! deposit and redemption queues.
//!
//! ## Batch settlement
//!
//! Settlement is split in two so the engine can commit atomically:
//!
//! 1. [`QueueManager::plan_batch`] walks up to `max` entries from the head
//!    and prices each through a caller-supplied quote. An entry whose output
//!    falls short of its `min_out` is *skipped*: it stays queued and is
//!    retried on the next batch. Skips never abort the batch, so one stale
//!    limit cannot hold everyone else hostage. Planning mutates nothing.
//! 2. [`QueueManager::settle`] removes the filled entries once the caller
//!    has applied their effects.
//!
//! [`QueueManager::process_batch`] does both for callers with no state of
//! their own to commit.
//!
//! ## Entry lifecycle
//!
//! ```text
//! Pending ──settle──▶ Settled
//!    │ ▲
//!    │ └── skipped (min_out not met), stays Pending
//!    └──cancel──▶ Cancelled
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vaultline_core::{Decimal, MathError, MathResult};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Amounts must be strictly positive.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// Deposit smaller than the fund minimum.
    #[error("amount {amount} is below the minimum investment of {minimum}")]
    BelowMinimum {
        /// Requested amount.
        amount: Decimal,
        /// Fund minimum.
        minimum: Decimal,
    },

    /// No pending entry with this id in the queue.
    #[error("queue entry {0} not found")]
    EntryNotFound(u64),

    /// The entry belongs to someone else.
    #[error("unauthorized: {requester} does not own queue entry {entry_id}")]
    Unauthorized {
        /// Caller.
        requester: String,
        /// Entry they tried to modify.
        entry_id: u64,
    },

    /// A partial cancellation asked for more than the entry holds.
    #[error("cannot reduce entry {entry_id} by {requested}: only {remaining} pending")]
    ReductionExceedsEntry {
        /// Entry being reduced.
        entry_id: u64,
        /// Amount the caller tried to remove.
        requested: Decimal,
        /// Amount still pending on the entry.
        remaining: Decimal,
    },

    /// The sequence counter ran out.
    #[error("queue sequence numbers exhausted")]
    SequenceExhausted,

    /// Queue arithmetic failed.
    #[error("queue arithmetic: {0}")]
    Math(#[from] MathError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which queue a request lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Base asset in, shares out. `amount` is in base asset units.
    Deposit,
    /// Shares in, base asset out. `amount` is in shares.
    Redemption,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Deposit => write!(f, "deposit"),
            RequestKind::Redemption => write!(f, "redemption"),
        }
    }
}

/// A pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Sequence number assigned at submission. Doubles as the entry id.
    pub id: u64,
    /// Queue the entry belongs to.
    pub kind: RequestKind,
    /// Who submitted it.
    pub requester: String,
    /// Base asset for deposits, shares for redemptions.
    pub amount: Decimal,
    /// Minimum acceptable output: shares for deposits, net payout for
    /// redemptions.
    pub min_out: Decimal,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// A priced entry, as returned by the caller's quote function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote<S> {
    /// The amount compared against the entry's `min_out`.
    pub output: Decimal,
    /// Whatever else the caller needs to commit the fill.
    pub detail: S,
}

/// An entry the plan will settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill<S> {
    pub entry: QueueEntry,
    pub output: Decimal,
    pub detail: S,
}

/// Result of planning a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan<S> {
    /// Queue the plan was built from.
    pub kind: RequestKind,
    /// Entries to settle, in FIFO order.
    pub fills: Vec<Fill<S>>,
    /// Ids left in the queue because `min_out` was not met.
    pub skipped: Vec<u64>,
}

impl<S> BatchPlan<S> {
    pub fn processed(&self) -> usize {
        self.fills.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

// ---------------------------------------------------------------------------
// QueueManager
// ---------------------------------------------------------------------------

/// Deposit and redemption queues for one fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueManager {
    deposits: VecDeque<QueueEntry>,
    redemptions: VecDeque<QueueEntry>,
    next_sequence: u64,
    min_investment: Decimal,
}

impl QueueManager {
    /// Creates empty queues. Deposits below `min_investment` are refused.
    pub fn new(min_investment: Decimal) -> Self {
        Self {
            deposits: VecDeque::new(),
            redemptions: VecDeque::new(),
            next_sequence: 1,
            min_investment,
        }
    }

    fn queue(&self, kind: RequestKind) -> &VecDeque<QueueEntry> {
        match kind {
            RequestKind::Deposit => &self.deposits,
            RequestKind::Redemption => &self.redemptions,
        }
    }

    fn queue_mut(&mut self, kind: RequestKind) -> &mut VecDeque<QueueEntry> {
        match kind {
            RequestKind::Deposit => &mut self.deposits,
            RequestKind::Redemption => &mut self.redemptions,
        }
    }

    pub fn min_investment(&self) -> Decimal {
        self.min_investment
    }

    /// Applies a new minimum to future submissions. Entries already queued
    /// are left as they are.
    pub fn set_min_investment(&mut self, min_investment: Decimal) {
        self.min_investment = min_investment;
    }

    /// Appends a request to the tail of its queue and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidAmount`] for a zero amount and
    /// [`QueueError::BelowMinimum`] for a deposit under the fund minimum.
    pub fn submit(
        &mut self,
        kind: RequestKind,
        requester: &str,
        amount: Decimal,
        min_out: Decimal,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        if amount.is_zero() {
            return Err(QueueError::InvalidAmount);
        }
        if kind == RequestKind::Deposit && amount < self.min_investment {
            return Err(QueueError::BelowMinimum {
                amount,
                minimum: self.min_investment,
            });
        }

        let id = self.next_sequence;
        self.next_sequence = id.checked_add(1).ok_or(QueueError::SequenceExhausted)?;

        self.queue_mut(kind).push_back(QueueEntry {
            id,
            kind,
            requester: requester.to_string(),
            amount,
            min_out,
            submitted_at: now,
        });

        Ok(id)
    }

    /// Removes up to `max_count` of `requester`'s entries, oldest first.
    ///
    /// Other requesters' entries are passed over, not counted. Returns the
    /// removed entries.
    pub fn cancel(
        &mut self,
        kind: RequestKind,
        requester: &str,
        max_count: usize,
    ) -> Vec<QueueEntry> {
        let queue = self.queue_mut(kind);
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());

        for entry in queue.drain(..) {
            if removed.len() < max_count && entry.requester == requester {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }

        *queue = kept;
        removed
    }

    /// Shrinks one entry by `amount`, returning what remains pending.
    ///
    /// `min_out` is scaled down in proportion. Reducing an entry to zero
    /// removes it.
    ///
    /// # Errors
    ///
    /// [`QueueError::EntryNotFound`] if the id is not queued,
    /// [`QueueError::Unauthorized`] if `requester` does not own it,
    /// [`QueueError::ReductionExceedsEntry`] if `amount` is too large and
    /// [`QueueError::BelowMinimum`] if a deposit would drop below the fund
    /// minimum without being cancelled outright.
    pub fn reduce(
        &mut self,
        kind: RequestKind,
        requester: &str,
        entry_id: u64,
        amount: Decimal,
    ) -> Result<Decimal, QueueError> {
        if amount.is_zero() {
            return Err(QueueError::InvalidAmount);
        }

        let min_investment = self.min_investment;
        let queue = self.queue_mut(kind);
        let position = queue
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or(QueueError::EntryNotFound(entry_id))?;
        let entry = &queue[position];

        if entry.requester != requester {
            return Err(QueueError::Unauthorized {
                requester: requester.to_string(),
                entry_id,
            });
        }
        if amount > entry.amount {
            return Err(QueueError::ReductionExceedsEntry {
                entry_id,
                requested: amount,
                remaining: entry.amount,
            });
        }

        let remaining = entry.amount.checked_sub(amount)?;
        if remaining.is_zero() {
            queue.remove(position);
            return Ok(Decimal::ZERO);
        }
        if kind == RequestKind::Deposit && remaining < min_investment {
            return Err(QueueError::BelowMinimum {
                amount: remaining,
                minimum: min_investment,
            });
        }

        let min_out = entry.min_out.mul_div(remaining.raw(), entry.amount.raw())?;
        let entry = &mut queue[position];
        entry.amount = remaining;
        entry.min_out = min_out;
        Ok(remaining)
    }

    /// Prices up to `max` entries from the head of the queue without
    /// modifying it.
    ///
    /// Entries whose quoted output is below their `min_out` are listed in
    /// `skipped`. An error from `quote` aborts planning and is returned as is.
    pub fn plan_batch<S, E, F>(
        &self,
        kind: RequestKind,
        max: usize,
        mut quote: F,
    ) -> Result<BatchPlan<S>, E>
    where
        F: FnMut(&QueueEntry) -> Result<Quote<S>, E>,
    {
        let mut fills = Vec::new();
        let mut skipped = Vec::new();

        for entry in self.queue(kind).iter().take(max) {
            let Quote { output, detail } = quote(entry)?;
            if output < entry.min_out {
                tracing::debug!(
                    entry_id = entry.id,
                    %kind,
                    %output,
                    min_out = %entry.min_out,
                    "queue entry skipped: below min_out"
                );
                skipped.push(entry.id);
            } else {
                fills.push(Fill {
                    entry: entry.clone(),
                    output,
                    detail,
                });
            }
        }

        Ok(BatchPlan {
            kind,
            fills,
            skipped,
        })
    }

    /// Removes the given entry ids from the queue. Returns how many were found.
    pub fn settle(&mut self, kind: RequestKind, ids: &[u64]) -> usize {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        let queue = self.queue_mut(kind);
        let before = queue.len();
        queue.retain(|e| !ids.contains(&e.id));
        before - queue.len()
    }

    /// Plans a batch and immediately removes the filled entries.
    pub fn process_batch<S, E, F>(
        &mut self,
        kind: RequestKind,
        max: usize,
        quote: F,
    ) -> Result<BatchPlan<S>, E>
    where
        F: FnMut(&QueueEntry) -> Result<Quote<S>, E>,
    {
        let plan = self.plan_batch(kind, max, quote)?;
        let ids: Vec<u64> = plan.fills.iter().map(|f| f.entry.id).collect();
        self.settle(kind, &ids);
        Ok(plan)
    }

    // -- Queries ------------------------------------------------------------

    /// Number of pending entries in a queue.
    pub fn len(&self, kind: RequestKind) -> usize {
        self.queue(kind).len()
    }

    /// `true` if both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty() && self.redemptions.is_empty()
    }

    /// Pending entries in FIFO order.
    pub fn entries(&self, kind: RequestKind) -> impl Iterator<Item = &QueueEntry> {
        self.queue(kind).iter()
    }

    /// Sum of pending amounts in a queue.
    pub fn pending_total(&self, kind: RequestKind) -> MathResult<Decimal> {
        Decimal::checked_sum(self.queue(kind).iter().map(|e| e.amount))
    }

    /// Sum of `requester`'s pending amounts in a queue.
    pub fn pending_for(&self, kind: RequestKind, requester: &str) -> MathResult<Decimal> {
        Decimal::checked_sum(
            self.queue(kind)
                .iter()
                .filter(|e| e.requester == requester)
                .map(|e| e.amount),
        )
    }

    /// Id the next submission will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
