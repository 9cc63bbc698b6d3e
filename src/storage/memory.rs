use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::edgar::parsing::values::normalize_cik;
use crate::ownership::model::{
    DerivativeSecurity, Entity, PositionSnapshot, Relationship, Security, Transaction,
};
use crate::ownership::pipeline::{FilingBundle, FilingMetadata};
use crate::storage::{FilingSink, PersistSummary, StorageError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub filings: usize,
    pub entities: usize,
    pub securities: usize,
    pub derivative_securities: usize,
    pub relationships: usize,
    pub transactions: usize,
    pub snapshots: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    filings: BTreeMap<String, FilingMetadata>,
    entities: HashMap<Uuid, Entity>,
    securities: HashMap<Uuid, Security>,
    derivatives: HashMap<Uuid, DerivativeSecurity>,
    relationships: HashMap<Uuid, Relationship>,
    transactions: HashMap<Uuid, Transaction>,
    snapshots: Vec<PositionSnapshot>,
}

/// In-process store with the same upsert rules a database sink would have.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn counts(&self) -> StoreCounts {
        let state = self.read();
        StoreCounts {
            filings: state.filings.len(),
            entities: state.entities.len(),
            securities: state.securities.len(),
            derivative_securities: state.derivatives.len(),
            relationships: state.relationships.len(),
            transactions: state.transactions.len(),
            snapshots: state.snapshots.len(),
        }
    }

    pub fn filing(&self, accession_number: &str) -> Option<FilingMetadata> {
        self.read().filings.get(accession_number).cloned()
    }

    pub fn entity_by_cik(&self, cik: &str) -> Option<Entity> {
        let cik = normalize_cik(cik)?;
        self.read().entities.get(&Entity::id_for_cik(&cik)).cloned()
    }

    pub fn entity(&self, id: Uuid) -> Option<Entity> {
        self.read().entities.get(&id).cloned()
    }

    pub fn security(&self, id: Uuid) -> Option<Security> {
        self.read().securities.get(&id).cloned()
    }

    pub fn relationships_for(&self, accession_number: &str) -> Vec<Relationship> {
        let mut relationships: Vec<Relationship> = self
            .read()
            .relationships
            .values()
            .filter(|r| r.accession_number == accession_number)
            .cloned()
            .collect();
        relationships.sort_by_key(|r| r.id);
        relationships
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        let mut relationships: Vec<Relationship> =
            self.read().relationships.values().cloned().collect();
        relationships.sort_by(|a, b| {
            (a.filing_date, &a.accession_number, a.id).cmp(&(b.filing_date, &b.accession_number, b.id))
        });
        relationships
    }

    pub fn transactions_for(&self, accession_number: &str) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .read()
            .transactions
            .values()
            .filter(|t| t.accession_number == accession_number)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| (t.transaction_date, t.id));
        transactions
    }

    /// Stored snapshots of one issuer and owner pair in date order, for
    /// seeding a ledger.
    pub fn snapshots_for(&self, ownership_id: Uuid) -> Vec<PositionSnapshot> {
        let mut snapshots: Vec<PositionSnapshot> = self
            .read()
            .snapshots
            .iter()
            .filter(|s| s.ownership_id == ownership_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.position_date);
        snapshots
    }

    pub fn all_snapshots(&self) -> Vec<PositionSnapshot> {
        self.read().snapshots.clone()
    }

    fn check_references(state: &StoreState, bundle: &FilingBundle) -> Result<(), StorageError> {
        let violation = |message: String| StorageError::ConstraintViolation {
            accession_number: bundle.accession_number().to_string(),
            message,
        };

        let entity_ids: HashSet<Uuid> = std::iter::once(bundle.issuer.id)
            .chain(bundle.owners.iter().map(|o| o.id))
            .chain(state.entities.keys().copied())
            .collect();
        // Stored relationships of this filing are about to be replaced.
        let relationship_ids: HashSet<Uuid> = bundle
            .relationships
            .iter()
            .map(|r| r.id)
            .chain(
                state
                    .relationships
                    .values()
                    .filter(|r| r.accession_number != bundle.accession_number())
                    .map(|r| r.id),
            )
            .collect();
        let security_ids: HashSet<Uuid> = bundle
            .securities
            .iter()
            .map(|s| s.id)
            .chain(state.securities.keys().copied())
            .collect();
        let derivative_ids: HashSet<Uuid> = bundle
            .derivative_securities
            .iter()
            .map(|d| d.id)
            .chain(state.derivatives.keys().copied())
            .collect();

        for rel in &bundle.relationships {
            for entity_id in [rel.issuer_entity_id, rel.owner_entity_id] {
                if !entity_ids.contains(&entity_id) {
                    return Err(violation(format!(
                        "relationship {} references unknown entity {}",
                        rel.id, entity_id
                    )));
                }
            }
        }
        for security in &bundle.securities {
            if !entity_ids.contains(&security.issuer_entity_id) {
                return Err(violation(format!(
                    "security {} references unknown issuer {}",
                    security.id, security.issuer_entity_id
                )));
            }
        }
        for derivative in &bundle.derivative_securities {
            if !security_ids.contains(&derivative.security_id) {
                return Err(violation(format!(
                    "derivative security {} references unknown security {}",
                    derivative.id, derivative.security_id
                )));
            }
        }
        for txn in &bundle.transactions {
            if !relationship_ids.contains(&txn.relationship_id) {
                return Err(violation(format!(
                    "transaction {} references unknown relationship {}",
                    txn.id, txn.relationship_id
                )));
            }
            if !security_ids.contains(&txn.security_id) {
                return Err(violation(format!(
                    "transaction {} references unknown security {}",
                    txn.id, txn.security_id
                )));
            }
            if let Some(derivative_id) = txn.derivative_security_id {
                if !derivative_ids.contains(&derivative_id) {
                    return Err(violation(format!(
                        "transaction {} references unknown derivative security {}",
                        txn.id, derivative_id
                    )));
                }
            }
        }
        for snapshot in &bundle.positions {
            if !relationship_ids.contains(&snapshot.relationship_id) {
                return Err(violation(format!(
                    "position on {} references unknown relationship {}",
                    snapshot.position_date, snapshot.relationship_id
                )));
            }
        }
        Ok(())
    }

    fn apply(state: &mut StoreState, bundle: &FilingBundle) -> PersistSummary {
        let accession = bundle.accession_number();
        let mut summary = PersistSummary {
            accession_number: accession.to_string(),
            replaced: state.filings.contains_key(accession),
            ..PersistSummary::default()
        };

        // Replace, never merge, the records owned by this filing.
        state.relationships.retain(|_, r| r.accession_number != accession);
        state.transactions.retain(|_, t| t.accession_number != accession);
        // Snapshots of this filing it no longer produces go; the rest are
        // upserted below.
        let transaction_ids: HashSet<Uuid> = bundle.transactions.iter().map(|t| t.id).collect();
        state.snapshots.retain(|s| {
            s.filing_id != accession
                || s.transaction_id
                    .map(|id| transaction_ids.contains(&id))
                    .unwrap_or(false)
                || bundle.positions.iter().any(|p| p.same_slot(s))
        });

        for entity in std::iter::once(&bundle.issuer).chain(bundle.owners.iter()) {
            match state.entities.get_mut(&entity.id) {
                Some(existing) if existing != entity => {
                    log::debug!(
                        "Correcting entity {}: {:?} -> {:?}",
                        entity.cik,
                        existing.name,
                        entity.name
                    );
                    *existing = entity.clone();
                    summary.entities_updated += 1;
                }
                Some(_) => {}
                None => {
                    state.entities.insert(entity.id, entity.clone());
                    summary.entities_inserted += 1;
                }
            }
        }

        for security in &bundle.securities {
            if state.securities.insert(security.id, security.clone()).is_none() {
                summary.securities_inserted += 1;
            }
        }
        for derivative in &bundle.derivative_securities {
            state
                .derivatives
                .entry(derivative.id)
                .and_modify(|existing| {
                    existing.exercise_date = existing.exercise_date.or(derivative.exercise_date);
                    existing.expiration_date =
                        existing.expiration_date.or(derivative.expiration_date);
                    existing.underlying_security_id = existing
                        .underlying_security_id
                        .or(derivative.underlying_security_id);
                })
                .or_insert_with(|| derivative.clone());
        }

        for rel in &bundle.relationships {
            state.relationships.insert(rel.id, rel.clone());
        }
        for txn in &bundle.transactions {
            state.transactions.insert(txn.id, txn.clone());
        }

        // A later ledger run may already have rewritten a position this
        // bundle carries; the higher revision stays.
        for snapshot in &bundle.positions {
            match state.snapshots.iter().position(|s| s.same_slot(snapshot)) {
                Some(idx) if state.snapshots[idx].revision > snapshot.revision => {
                    log::debug!(
                        "Keeping revision {} of position on {} over revision {} from {}",
                        state.snapshots[idx].revision,
                        snapshot.position_date,
                        snapshot.revision,
                        accession
                    );
                    summary.stale_positions += 1;
                }
                Some(idx) => {
                    state.snapshots[idx] = snapshot.clone();
                    summary.positions += 1;
                }
                None => {
                    state.snapshots.push(snapshot.clone());
                    summary.positions += 1;
                }
            }
        }

        state
            .filings
            .insert(accession.to_string(), bundle.metadata.clone());

        summary.relationships = bundle.relationships.len();
        summary.transactions = bundle.transactions.len();
        summary
    }
}

#[async_trait]
impl FilingSink for MemoryStore {
    async fn persist(&self, bundle: &FilingBundle) -> Result<PersistSummary, StorageError> {
        if bundle.accession_number().trim().is_empty() {
            return Err(StorageError::MissingAccession);
        }

        let mut state = self.write();
        if let Err(e) = Self::check_references(&state, bundle) {
            log::error!("Rejecting filing {}: {}", bundle.accession_number(), e);
            return Err(e);
        }
        let summary = Self::apply(&mut state, bundle);
        log::info!(
            "Stored filing {} ({} relationships, {} transactions, {} positions{})",
            summary.accession_number,
            summary.relationships,
            summary.transactions,
            summary.positions,
            if summary.replaced { ", replaced" } else { "" }
        );
        Ok(summary)
    }
}
