use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use super::model::{PositionSnapshot, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction {0} has no transaction date")]
    MissingDate(Uuid),

    #[error("transaction {0} has no acquired/disposed flag")]
    MissingFlag(Uuid),

    #[error("transaction {0} is a position-only holding")]
    PositionOnly(Uuid),

    #[error("transaction {0} is not a position-only holding")]
    NotPositionOnly(Uuid),
}

/// A position line: one owner's holding of one security, split by
/// derivative instrument and by direct/indirect ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub ownership_id: Uuid,
    pub security_id: Uuid,
    pub derivative_security_id: Option<Uuid>,
    pub direct_ownership: bool,
}

impl LineKey {
    pub fn of_transaction(txn: &Transaction) -> Self {
        Self {
            ownership_id: txn.ownership_id,
            security_id: txn.security_id,
            derivative_security_id: txn.derivative_security_id,
            direct_ownership: txn.direct_ownership,
        }
    }

    pub fn of_snapshot(snapshot: &PositionSnapshot) -> Self {
        Self {
            ownership_id: snapshot.ownership_id,
            security_id: snapshot.security_id,
            derivative_security_id: snapshot.derivative_security_id,
            direct_ownership: snapshot.direct_ownership,
        }
    }
}

#[derive(Debug, Default)]
struct Line {
    /// Ordered by date; equal dates keep insertion order.
    snapshots: Vec<PositionSnapshot>,
    transactions: Vec<Transaction>,
}

impl Line {
    fn insert_snapshot(&mut self, snapshot: PositionSnapshot) {
        let at = self
            .snapshots
            .partition_point(|s| s.position_date <= snapshot.position_date);
        self.snapshots.insert(at, snapshot);
    }

    fn latest_before(&self, date: NaiveDate) -> Option<&PositionSnapshot> {
        self.snapshots.iter().rev().find(|s| s.position_date < date)
    }

    fn latest_on_or_before(&self, date: Option<NaiveDate>) -> Option<&PositionSnapshot> {
        match date {
            Some(date) => self.snapshots.iter().rev().find(|s| s.position_date <= date),
            None => self.snapshots.last(),
        }
    }

    fn has_transaction_snapshot_after(&self, date: NaiveDate) -> bool {
        self.snapshots
            .iter()
            .any(|s| !s.is_position_only && s.position_date > date)
    }
}

/// Running share positions per line.
///
/// The ledger is an explicit state object: seed it with prior snapshots,
/// feed it a batch of filings, and drain the snapshots it produced after
/// each one. Call [`PositionLedger::reset`] or build a new one between
/// unrelated batches.
///
/// Every snapshot written carries the next value of a revision counter, so a
/// store can tell a replayed position from the one it replaces.
#[derive(Debug, Default)]
pub struct PositionLedger {
    lines: HashMap<LineKey, Line>,
    emitted: Vec<PositionSnapshot>,
    revision: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger that already knows about previously stored snapshots.
    pub fn seeded(snapshots: impl IntoIterator<Item = PositionSnapshot>) -> Self {
        let mut ledger = Self::new();
        ledger.seed(snapshots);
        ledger
    }

    /// Adds stored snapshots. The revision counter continues past the
    /// highest one seen.
    pub fn seed(&mut self, snapshots: impl IntoIterator<Item = PositionSnapshot>) {
        for snapshot in snapshots {
            self.revision = self.revision.max(snapshot.revision);
            self.lines
                .entry(LineKey::of_snapshot(&snapshot))
                .or_default()
                .insert_snapshot(snapshot);
        }
    }

    /// Forgets all lines. The revision counter keeps counting.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.emitted.clear();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Snapshots produced since the last drain, in production order.
    pub fn drain_emitted(&mut self) -> Vec<PositionSnapshot> {
        std::mem::take(&mut self.emitted)
    }

    pub fn snapshots(&self, key: &LineKey) -> &[PositionSnapshot] {
        self.lines
            .get(key)
            .map(|line| line.snapshots.as_slice())
            .unwrap_or(&[])
    }

    pub fn line_keys(&self) -> impl Iterator<Item = &LineKey> {
        self.lines.keys()
    }

    fn emit(&mut self, snapshot: PositionSnapshot) {
        match self.emitted.iter().position(|s| s.same_slot(&snapshot)) {
            Some(idx) => self.emitted[idx] = snapshot,
            None => self.emitted.push(snapshot),
        }
    }

    /// Applies one dated transaction on top of the line's position as of the
    /// day before. Transactions on the same date do not see each other.
    pub fn update_from_transaction(
        &mut self,
        txn: &Transaction,
    ) -> Result<PositionSnapshot, LedgerError> {
        if txn.is_position_only {
            return Err(LedgerError::PositionOnly(txn.id));
        }
        let date = txn.transaction_date.ok_or(LedgerError::MissingDate(txn.id))?;
        let impact = txn.share_impact().ok_or(LedgerError::MissingFlag(txn.id))?;

        let revision = self.next_revision();
        let key = LineKey::of_transaction(txn);
        let line = self.lines.entry(key).or_default();

        match line.transactions.iter().position(|t| t.id == txn.id) {
            Some(idx) => line.transactions[idx] = txn.clone(),
            None => line.transactions.push(txn.clone()),
        }
        line.snapshots.retain(|s| s.transaction_id != Some(txn.id));

        let prior = line
            .latest_before(date)
            .map(|s| s.shares_amount)
            .unwrap_or(Decimal::ZERO);

        let snapshot = PositionSnapshot {
            relationship_id: txn.relationship_id,
            ownership_id: key.ownership_id,
            security_id: key.security_id,
            derivative_security_id: key.derivative_security_id,
            position_date: date,
            shares_amount: prior + impact,
            direct_ownership: key.direct_ownership,
            is_position_only: false,
            transaction_id: Some(txn.id),
            filing_id: txn.accession_number.clone(),
            revision,
        };
        log::debug!(
            "Line {}/{}: {} {} -> {} on {}",
            key.ownership_id,
            key.security_id,
            prior,
            impact,
            snapshot.shares_amount,
            date
        );
        line.insert_snapshot(snapshot.clone());
        self.emit(snapshot.clone());
        Ok(snapshot)
    }

    /// Applies a transaction, replaying the rest of its line when it arrives
    /// after transactions dated later than itself.
    pub fn apply(&mut self, txn: &Transaction) -> Result<Vec<PositionSnapshot>, LedgerError> {
        let date = txn.transaction_date.ok_or(LedgerError::MissingDate(txn.id))?;
        let out_of_order = self.has_transaction_snapshot_after(&LineKey::of_transaction(txn), date);

        let snapshot = self.update_from_transaction(txn)?;
        if out_of_order {
            log::info!(
                "Transaction {} dated {} arrived out of order, recalculating",
                txn.id,
                date
            );
            Ok(self.recalculate(txn.ownership_id, txn.security_id, Some(date)))
        } else {
            Ok(vec![snapshot])
        }
    }

    fn has_transaction_snapshot_after(&self, key: &LineKey, date: NaiveDate) -> bool {
        self.lines
            .get(key)
            .map(|line| line.has_transaction_snapshot_after(date))
            .unwrap_or(false)
    }

    /// Records a declared holding. A second holding for the same line and
    /// date updates the first. Transaction positions dated after the holding
    /// are replayed on top of it.
    pub fn record_position_only(
        &mut self,
        holding: &Transaction,
        position_date: NaiveDate,
    ) -> Result<PositionSnapshot, LedgerError> {
        if !holding.is_position_only {
            return Err(LedgerError::NotPositionOnly(holding.id));
        }
        let key = LineKey::of_transaction(holding);
        let out_of_order = self.has_transaction_snapshot_after(&key, position_date);
        let revision = self.next_revision();
        let line = self.lines.entry(key).or_default();

        let existing = line
            .snapshots
            .iter()
            .position(|s| s.is_position_only && s.position_date == position_date);

        let snapshot = match existing {
            Some(idx) => {
                log::debug!(
                    "Updating position-only snapshot for {}/{} on {}",
                    key.ownership_id,
                    key.security_id,
                    position_date
                );
                let snapshot = &mut line.snapshots[idx];
                snapshot.shares_amount = holding.shares_amount;
                snapshot.relationship_id = holding.relationship_id;
                snapshot.filing_id = holding.accession_number.clone();
                snapshot.revision = revision;
                snapshot.clone()
            }
            None => {
                let snapshot = PositionSnapshot {
                    relationship_id: holding.relationship_id,
                    ownership_id: key.ownership_id,
                    security_id: key.security_id,
                    derivative_security_id: key.derivative_security_id,
                    position_date,
                    shares_amount: holding.shares_amount,
                    direct_ownership: key.direct_ownership,
                    is_position_only: true,
                    transaction_id: None,
                    filing_id: holding.accession_number.clone(),
                    revision,
                };
                line.insert_snapshot(snapshot.clone());
                snapshot
            }
        };
        self.emit(snapshot.clone());

        if out_of_order {
            log::info!(
                "Holding for {}/{} dated {} precedes recorded transactions, recalculating",
                key.ownership_id,
                key.security_id,
                position_date
            );
            self.recalculate(key.ownership_id, key.security_id, Some(position_date));
        }
        Ok(snapshot)
    }

    /// Drops transaction-derived snapshots on or after `start` (all of them
    /// without a start) on every line of the ownership and security, then
    /// replays the line's transactions in date order. Seeded snapshots whose
    /// transactions this ledger has not seen are kept as they are.
    pub fn recalculate(
        &mut self,
        ownership_id: Uuid,
        security_id: Uuid,
        start: Option<NaiveDate>,
    ) -> Vec<PositionSnapshot> {
        let keys: Vec<LineKey> = self
            .lines
            .keys()
            .filter(|k| k.ownership_id == ownership_id && k.security_id == security_id)
            .copied()
            .collect();

        let in_range = |date: Option<NaiveDate>| match (date, start) {
            (Some(date), Some(start)) => date >= start,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let mut replay = Vec::new();
        for key in keys {
            let Some(line) = self.lines.get_mut(&key) else {
                continue;
            };
            let known: HashSet<Uuid> = line.transactions.iter().map(|t| t.id).collect();
            line.snapshots.retain(|s| {
                let replayable = s.transaction_id.map(|id| known.contains(&id)).unwrap_or(false);
                !(replayable && in_range(Some(s.position_date)))
            });
            replay.extend(
                line.transactions
                    .iter()
                    .filter(|t| in_range(t.transaction_date))
                    .cloned(),
            );
        }
        // Stable sort keeps filing order for transactions on the same date.
        replay.sort_by_key(|t| t.transaction_date);

        let mut produced = Vec::new();
        for txn in &replay {
            match self.update_from_transaction(txn) {
                Ok(snapshot) => produced.push(snapshot),
                Err(e) => log::warn!("Skipping transaction {} during replay: {}", txn.id, e),
            }
        }
        produced
    }

    /// Shares held per security as of `as_of` (latest overall without a
    /// date), summing direct, indirect and derivative lines of the same
    /// security.
    pub fn totals(
        &self,
        ownership_id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> BTreeMap<Uuid, Decimal> {
        let mut totals = BTreeMap::new();
        for (key, line) in &self.lines {
            if key.ownership_id != ownership_id {
                continue;
            }
            if let Some(snapshot) = line.latest_on_or_before(as_of) {
                *totals.entry(key.security_id).or_insert(Decimal::ZERO) += snapshot.shares_amount;
            }
        }
        totals
    }

    /// Shares of non-derivative securities held as of `as_of`. Option and
    /// other derivative lines count instruments, not shares, and are left
    /// out. `None` when the owner has no non-derivative position.
    pub fn shares_held(&self, ownership_id: Uuid, as_of: Option<NaiveDate>) -> Option<Decimal> {
        self.lines
            .iter()
            .filter(|(key, _)| {
                key.ownership_id == ownership_id && key.derivative_security_id.is_none()
            })
            .filter_map(|(_, line)| line.latest_on_or_before(as_of))
            .map(|snapshot| snapshot.shares_amount)
            .reduce(|total, shares| total + shares)
    }
}
