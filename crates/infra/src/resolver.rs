//! Reservation resolution.
//!
//! Turns an operation's reservations into fully qualified ones: every
//! reservation against a source stockroom ends up naming exactly one lot, and
//! requests larger than a single lot are split across several. Resolution reads
//! the ledger but never writes it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use stockops_core::{DomainError, StockroomId};
use stockops_inventory::allocation::{
    closest_expiration, closest_expiration_in, find_exact, matching_batch, matching_expiration, oldest_batch,
};
use stockops_inventory::{Lot, ReservedTransaction, StockKey, StockOperation};

use crate::error::EngineResult;
use crate::ledger_store::StockLedger;
use crate::lock::{self, OperationLock};

/// Resolves reservations against current lot balances.
pub struct ReservationResolver<L> {
    ledger: L,
    lock: &'static OperationLock,
}

impl<L: StockLedger> ReservationResolver<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            lock: lock::global(),
        }
    }

    /// Resolve every reservation of `operation` in place.
    ///
    /// On error the operation's reservations are left as they were.
    #[instrument(
        skip(self, operation),
        fields(operation = %operation.id_typed(), kind = %operation.kind()),
        err
    )]
    pub fn resolve(&self, operation: &mut StockOperation) -> EngineResult<()> {
        let _guard = self.lock.acquire();

        let pending = consolidate(operation.reserved())?;
        let resolved = match operation.effective_source() {
            None => pending
                .into_iter()
                .map(|tx| resolve_without_source(operation, tx))
                .collect::<Result<Vec<_>, DomainError>>()?,
            Some(source) => {
                let mut scratch = Scratch::new(&self.ledger, source);
                let mut resolved = Vec::with_capacity(pending.len());
                for tx in pending {
                    scratch.resolve(tx, operation.operation_date(), &mut resolved)?;
                }
                resolved
            }
        };

        debug!(reservations = resolved.len(), "reservations resolved");
        *operation.reserved_mut() = resolved;
        Ok(())
    }
}

/// Merge reservations naming the same (item, expiration, batch) and order them
/// so explicit requests claim their lots before calculated ones.
fn consolidate(reserved: &[ReservedTransaction]) -> Result<Vec<ReservedTransaction>, DomainError> {
    let mut merged: Vec<ReservedTransaction> = Vec::with_capacity(reserved.len());
    for tx in reserved {
        match merged
            .iter_mut()
            .find(|m| m.item_id() == tx.item_id() && m.qualifier() == tx.qualifier())
        {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(tx.quantity).ok_or_else(|| {
                    DomainError::validation(format!(
                        "combined quantity for item '{}' is out of range",
                        tx.item.name
                    ))
                })?;
                existing.calculated_expiration |= tx.calculated_expiration;
                existing.calculated_batch |= tx.calculated_batch;
                existing.source_calculated_expiration |= tx.source_calculated_expiration;
                existing.source_calculated_batch |= tx.source_calculated_batch;
            }
            None => merged.push(tx.clone()),
        }
    }

    merged.sort_by(|a, b| {
        (a.item_id(), a.calculated_expiration, a.calculated_batch, a.id).cmp(&(
            b.item_id(),
            b.calculated_expiration,
            b.calculated_batch,
            b.id,
        ))
    });
    Ok(merged)
}

/// Stock entering the system: the operation itself becomes the lot's origin.
fn resolve_without_source(
    operation: &StockOperation,
    mut tx: ReservedTransaction,
) -> Result<ReservedTransaction, DomainError> {
    if tx.item.has_expiration && tx.expiration.is_none() {
        return Err(DomainError::missing_expiration(tx.item_id()));
    }

    tx.batch = Some(operation.as_batch_origin());
    tx.calculated_expiration = false;
    tx.calculated_batch = false;
    tx.source_calculated_expiration = false;
    tx.source_calculated_batch = false;
    Ok(tx)
}

/// Private copy of the source stockroom's lot balances for one resolution.
struct Scratch<'a, L> {
    ledger: &'a L,
    source: StockroomId,
    lots: HashMap<StockKey, Vec<Lot>>,
}

impl<'a, L: StockLedger> Scratch<'a, L> {
    fn new(ledger: &'a L, source: StockroomId) -> Self {
        Self {
            ledger,
            source,
            lots: HashMap::new(),
        }
    }

    fn lots(&mut self, key: StockKey) -> EngineResult<&mut Vec<Lot>> {
        Ok(match self.lots.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let loaded = self
                    .ledger
                    .get(key.stockroom, key.item)?
                    .map(|stock| stock.lots().to_vec())
                    .unwrap_or_default();
                e.insert(loaded)
            }
        })
    }

    fn resolve(
        &mut self,
        tx: ReservedTransaction,
        date: DateTime<Utc>,
        out: &mut Vec<ReservedTransaction>,
    ) -> EngineResult<()> {
        let item = tx.item_id();
        if tx.item.has_expiration && tx.expiration.is_none() && !tx.calculated_expiration {
            return Err(DomainError::missing_expiration(item).into());
        }

        let source = self.source;
        let lots = self.lots(StockKey::new(source, item))?;

        if tx.quantity <= 0 {
            out.push(returning_to_source(lots, tx, date));
            return Ok(());
        }

        let mut remaining = tx.quantity;
        let mut current = tx.clone();
        loop {
            let Some(idx) = select_lot(lots, &current, date) else {
                return Err(DomainError::insufficient_stock(item, source, remaining).into());
            };

            let lot = &mut lots[idx];
            let take = lot.quantity.min(remaining);
            adopt_lot(&mut current, lot);
            current.quantity = take;

            lot.quantity -= take;
            if lot.quantity <= 0 {
                lots.remove(idx);
            }

            remaining -= take;
            out.push(current);
            if remaining == 0 {
                return Ok(());
            }

            current = tx.split(remaining);
            debug!(
                item = %item,
                stockroom = %source,
                drawn = take,
                remaining,
                "reservation split across lots"
            );
        }
    }
}

/// Stock going back into the source never runs short. It lands in the lot the
/// request points at when one exists, otherwise in a fresh lot.
fn returning_to_source(
    lots: &[Lot],
    mut tx: ReservedTransaction,
    date: DateTime<Utc>,
) -> ReservedTransaction {
    if !tx.is_calculated() {
        return tx;
    }

    match select_lot(lots, &tx, date) {
        Some(idx) => adopt_lot(&mut tx, &lots[idx]),
        None => {
            if tx.calculated_expiration {
                tx.expiration = None;
            }
            if tx.calculated_batch {
                tx.batch = None;
            }
            tx.calculated_expiration = false;
            tx.calculated_batch = false;
        }
    }
    tx
}

fn adopt_lot(tx: &mut ReservedTransaction, lot: &Lot) {
    tx.expiration = lot.expiration();
    tx.batch = lot.batch();
    tx.calculated_expiration = false;
    tx.calculated_batch = false;
    tx.source_calculated_expiration = lot.calculated_expiration;
    tx.source_calculated_batch = lot.calculated_batch;
}

fn select_lot(lots: &[Lot], tx: &ReservedTransaction, date: DateTime<Utc>) -> Option<usize> {
    match (tx.calculated_expiration, tx.calculated_batch) {
        (true, true) => oldest_batch(lots, &closest_expiration(lots, date)),
        (true, false) => {
            let same_batch = matching_batch(lots, tx.batch);
            closest_expiration_in(lots, &same_batch, date).first().copied()
        }
        (false, true) => oldest_batch(lots, &matching_expiration(lots, tx.expiration)),
        (false, false) => find_exact(lots, &tx.qualifier()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use stockops_core::{OperationId, PatientId};
    use stockops_inventory::{
        BatchOrigin, Item, ItemStock, LotQualifier, OperationItem, OperationKind, Recipient,
    };

    use crate::error::EngineError;
    use crate::ledger_store::InMemoryStockLedger;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn origin(days_ago: i64) -> BatchOrigin {
        BatchOrigin::new(OperationId::new(), now() - Duration::days(days_ago))
    }

    fn seeded(item: &Item, stockroom: StockroomId, lots: Vec<Lot>) -> ReservationResolver<Arc<InMemoryStockLedger>> {
        let ledger = Arc::new(InMemoryStockLedger::new());
        ledger.save(ItemStock::from_lots(stockroom, item.id, lots)).unwrap();
        ReservationResolver::new(ledger)
    }

    fn distribution(source: StockroomId, line: OperationItem) -> StockOperation {
        let mut op = StockOperation::new(OperationKind::Distribution, "D-1", now())
            .with_source(source)
            .with_recipient(Recipient::Patient(PatientId::new()))
            .with_item(line);
        op.create_reservations().unwrap();
        op
    }

    #[test]
    fn calculated_batch_draws_oldest_lot_first_and_splits() {
        let item = Item::new("bandage");
        let source = StockroomId::new();
        let (old, new) = (origin(10), origin(2));
        let resolver = seeded(
            &item,
            source,
            vec![
                Lot::new(LotQualifier::new(None, Some(new)), 5),
                Lot::new(LotQualifier::new(None, Some(old)), 5),
            ],
        );

        let mut op = distribution(source, OperationItem::new(item, 7));
        resolver.resolve(&mut op).unwrap();

        let drawn: Vec<(i64, Option<BatchOrigin>)> =
            op.reserved().iter().map(|tx| (tx.quantity, tx.batch)).collect();
        assert_eq!(drawn, vec![(5, Some(old)), (2, Some(new))]);
        assert!(op.reserved().iter().all(|tx| !tx.is_calculated()));
    }

    #[test]
    fn calculated_expiration_prefers_closest_date() {
        let item = Item::expirable("vaccine");
        let source = StockroomId::new();
        let soon = now() + Duration::days(30);
        let later = now() + Duration::days(300);
        let resolver = seeded(
            &item,
            source,
            vec![
                Lot::new(LotQualifier::new(Some(later), Some(origin(50))), 10),
                Lot::new(LotQualifier::new(Some(soon), Some(origin(1))), 10),
            ],
        );

        let mut op = distribution(source, OperationItem::new(item, 4));
        resolver.resolve(&mut op).unwrap();

        assert_eq!(op.reserved().len(), 1);
        assert_eq!(op.reserved()[0].expiration, Some(soon));
    }

    #[test]
    fn explicit_qualifier_must_match_exactly() {
        let item = Item::new("gown");
        let source = StockroomId::new();
        let batch = origin(3);
        let resolver = seeded(&item, source, vec![Lot::new(LotQualifier::new(None, Some(batch)), 2)]);

        let mut op = distribution(source, OperationItem::new(item.clone(), 2).with_batch(batch));
        resolver.resolve(&mut op).unwrap();
        assert_eq!(op.reserved()[0].batch, Some(batch));

        let mut other = distribution(source, OperationItem::new(item, 1).with_batch(origin(3)));
        assert!(matches!(
            resolver.resolve(&mut other),
            Err(EngineError::InsufficientStock { shortfall: 1, .. })
        ));
    }

    #[test]
    fn shortfall_leaves_reservations_untouched() {
        let item = Item::new("mask");
        let source = StockroomId::new();
        let resolver = seeded(&item, source, vec![Lot::new(LotQualifier::new(None, Some(origin(1))), 3)]);

        let mut op = distribution(source, OperationItem::new(item.clone(), 5));
        let before = op.clone();
        let err = resolver.resolve(&mut op).unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientStock {
                item: item.id,
                stockroom: source,
                shortfall: 2
            }
        );
        assert_eq!(op, before);
    }

    #[test]
    fn duplicate_requests_are_merged() {
        let item = Item::new("swab");
        let source = StockroomId::new();
        let resolver = seeded(&item, source, vec![Lot::new(LotQualifier::new(None, Some(origin(1))), 10)]);

        let mut op = StockOperation::new(OperationKind::Disposal, "X-1", now())
            .with_source(source)
            .with_item(OperationItem::new(item.clone(), 2))
            .with_item(OperationItem::new(item, 3));
        op.create_reservations().unwrap();
        resolver.resolve(&mut op).unwrap();

        assert_eq!(op.reserved().len(), 1);
        assert_eq!(op.reserved()[0].quantity, 5);
    }

    #[test]
    fn receipt_of_expirable_item_needs_expiration() {
        let item = Item::expirable("insulin");
        let resolver = ReservationResolver::new(InMemoryStockLedger::new());

        let mut op = StockOperation::new(OperationKind::Receipt, "R-1", now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(item.clone(), 5));
        op.create_reservations().unwrap();

        assert_eq!(
            resolver.resolve(&mut op),
            Err(EngineError::MissingExpiration { item: item.id })
        );
    }

    #[test]
    fn receipt_becomes_its_own_batch() {
        let item = Item::new("gauze");
        let resolver = ReservationResolver::new(InMemoryStockLedger::new());

        let mut op = StockOperation::new(OperationKind::Receipt, "R-2", now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(item, 5));
        op.create_reservations().unwrap();
        resolver.resolve(&mut op).unwrap();

        assert_eq!(op.reserved()[0].batch, Some(op.as_batch_origin()));
        assert!(!op.reserved()[0].calculated_batch);
    }

    #[test]
    fn positive_adjustment_without_lots_creates_unqualified_reservation() {
        let item = Item::new("tape");
        let source = StockroomId::new();
        let resolver = ReservationResolver::new(InMemoryStockLedger::new());

        let mut op = StockOperation::new(OperationKind::Adjustment, "A-1", now())
            .with_source(source)
            .with_item(OperationItem::new(item, 6));
        op.create_reservations().unwrap();
        resolver.resolve(&mut op).unwrap();

        let tx = &op.reserved()[0];
        assert_eq!(tx.quantity, -6);
        assert_eq!(tx.qualifier(), LotQualifier::unqualified());
    }

    #[test]
    fn positive_adjustment_adopts_existing_lot() {
        let item = Item::new("tape");
        let source = StockroomId::new();
        let batch = origin(4);
        let resolver = seeded(&item, source, vec![Lot::new(LotQualifier::new(None, Some(batch)), 1)]);

        let mut op = StockOperation::new(OperationKind::Adjustment, "A-2", now())
            .with_source(source)
            .with_item(OperationItem::new(item, 6));
        op.create_reservations().unwrap();
        resolver.resolve(&mut op).unwrap();

        assert_eq!(op.reserved()[0].batch, Some(batch));
    }

    #[test]
    fn expirable_item_with_source_needs_expiration_or_calculation() {
        let item = Item::expirable("serum");
        let source = StockroomId::new();
        let resolver = seeded(&item, source, vec![]);

        let mut op = distribution(source, OperationItem::new(item.clone(), 1).without_expiration());
        assert_eq!(
            resolver.resolve(&mut op),
            Err(EngineError::MissingExpiration { item: item.id })
        );
    }

    #[test]
    fn merged_quantity_out_of_range_is_a_validation_error() {
        let item = Item::new("saline");
        let source = StockroomId::new();
        let resolver = seeded(&item, source, vec![Lot::new(LotQualifier::default(), 1)]);

        let mut op = StockOperation::new(OperationKind::Distribution, "D-9", now())
            .with_source(source)
            .with_recipient(Recipient::Patient(PatientId::new()))
            .with_item(OperationItem::new(item.clone(), i64::MAX))
            .with_item(OperationItem::new(item, i64::MAX));
        op.create_reservations().unwrap();

        assert!(matches!(resolver.resolve(&mut op), Err(EngineError::Validation(_))));
    }
}
