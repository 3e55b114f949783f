//! Lot-level stock: the `ItemStock` aggregate and its lots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockops_core::{AggregateRoot, ItemId, OperationId, StockroomId, ValueObject};

/// Identity of a persisted lot. Assigned by the ledger store on save, in
/// increasing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(pub u64);

impl core::fmt::Display for LotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "lot-{}", self.0)
    }
}

/// The operation a lot originated from (its "batch").
///
/// Two origins are equal when they name the same operation; the date is carried
/// along so the resolver can rank batches without loading the operation.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct BatchOrigin {
    pub operation_id: OperationId,
    /// `None` when the originating operation date is unknown; such lots never
    /// win an oldest-batch comparison.
    pub operation_date: Option<DateTime<Utc>>,
}

impl BatchOrigin {
    pub fn new(operation_id: OperationId, operation_date: DateTime<Utc>) -> Self {
        Self {
            operation_id,
            operation_date: Some(operation_date),
        }
    }

    pub fn undated(operation_id: OperationId) -> Self {
        Self {
            operation_id,
            operation_date: None,
        }
    }
}

impl PartialEq for BatchOrigin {
    fn eq(&self, other: &Self) -> bool {
        self.operation_id == other.operation_id
    }
}

impl Eq for BatchOrigin {}

impl core::hash::Hash for BatchOrigin {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.operation_id.hash(state);
    }
}

impl ValueObject for BatchOrigin {}

/// What makes a lot a lot: its expiration and its originating operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotQualifier {
    pub expiration: Option<DateTime<Utc>>,
    pub batch: Option<BatchOrigin>,
}

impl LotQualifier {
    pub fn new(expiration: Option<DateTime<Utc>>, batch: Option<BatchOrigin>) -> Self {
        Self { expiration, batch }
    }

    /// A lot with neither expiration nor origin.
    pub fn unqualified() -> Self {
        Self::default()
    }
}

impl ValueObject for LotQualifier {}

/// A sub-quantity of an item's stock sharing one qualifier
/// (an item stock detail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    id: Option<LotId>,
    pub qualifier: LotQualifier,
    pub quantity: i64,
    /// The expiration was inferred rather than specified.
    pub calculated_expiration: bool,
    /// The batch was inferred rather than specified.
    pub calculated_batch: bool,
}

impl Lot {
    pub fn new(qualifier: LotQualifier, quantity: i64) -> Self {
        Self {
            id: None,
            qualifier,
            quantity,
            calculated_expiration: false,
            calculated_batch: false,
        }
    }

    pub fn with_calculated(mut self, expiration: bool, batch: bool) -> Self {
        self.calculated_expiration = expiration;
        self.calculated_batch = batch;
        self
    }

    /// `None` until the ledger store has persisted the lot.
    pub fn id(&self) -> Option<LotId> {
        self.id
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.qualifier.expiration
    }

    pub fn batch(&self) -> Option<BatchOrigin> {
        self.qualifier.batch
    }
}

/// Key of an `ItemStock` aggregate: one item in one stockroom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub stockroom: StockroomId,
    pub item: ItemId,
}

impl StockKey {
    pub fn new(stockroom: StockroomId, item: ItemId) -> Self {
        Self { stockroom, item }
    }
}

/// A signed quantity change against one lot of an item stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotDelta {
    pub qualifier: LotQualifier,
    pub quantity: i64,
    pub calculated_expiration: bool,
    pub calculated_batch: bool,
}

/// Result of applying a batch of lot deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotApplyOutcome {
    /// Sum of all applied deltas.
    pub net: i64,
    /// Negative remainder that no lot could absorb. Non-zero only when the
    /// aggregate ends at or below zero.
    pub unabsorbed: i64,
}

/// Aggregate root: ItemStock.
///
/// Invariant: `quantity == sum(lot.quantity)` for every persisted state, and
/// no persisted lot has a quantity `<= 0`.
///
/// Lots are kept in canonical order: persisted lots by ascending `LotId`,
/// followed by unsaved lots in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStock {
    key: StockKey,
    quantity: i64,
    lots: Vec<Lot>,
    version: u64,
}

impl ItemStock {
    /// Create an empty, never-persisted aggregate.
    pub fn empty(stockroom: StockroomId, item: ItemId) -> Self {
        Self {
            key: StockKey::new(stockroom, item),
            quantity: 0,
            lots: Vec::new(),
            version: 0,
        }
    }

    /// Build an aggregate from lots; the aggregate quantity is their sum.
    pub fn from_lots(stockroom: StockroomId, item: ItemId, lots: Vec<Lot>) -> Self {
        let quantity = lots.iter().map(|l| l.quantity).sum();
        Self {
            key: StockKey::new(stockroom, item),
            quantity,
            lots,
            version: 0,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn stockroom(&self) -> StockroomId {
        self.key.stockroom
    }

    pub fn item(&self) -> ItemId {
        self.key.item
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn lot_quantity(&self) -> i64 {
        self.lots.iter().map(|l| l.quantity).sum()
    }

    /// `quantity == sum(lots)` and every lot strictly positive.
    pub fn is_consistent(&self) -> bool {
        self.quantity == self.lot_quantity() && self.lots.iter().all(|l| l.quantity > 0)
    }

    pub fn find_lot(&self, qualifier: &LotQualifier) -> Option<&Lot> {
        self.lots.iter().find(|l| l.qualifier == *qualifier)
    }

    /// Apply signed deltas to the matching lots, creating lots as needed.
    ///
    /// A lot that reaches zero is dropped. A lot driven below zero is dropped
    /// too and its negative remainder is absorbed, once every delta has been
    /// applied, by the remaining lots in canonical order.
    pub fn apply_deltas<'a>(&mut self, deltas: impl IntoIterator<Item = &'a LotDelta>) -> LotApplyOutcome {
        let mut net = 0i64;
        let mut deficit = 0i64;

        for delta in deltas {
            net += delta.quantity;

            let idx = match self.lots.iter().position(|l| l.qualifier == delta.qualifier) {
                Some(idx) => {
                    self.lots[idx].quantity += delta.quantity;
                    idx
                }
                None => {
                    self.lots.push(
                        Lot::new(delta.qualifier, delta.quantity)
                            .with_calculated(delta.calculated_expiration, delta.calculated_batch),
                    );
                    self.lots.len() - 1
                }
            };

            let running = self.lots[idx].quantity;
            if running <= 0 {
                self.lots.remove(idx);
                deficit -= running;
            }
        }

        let unabsorbed = if deficit > 0 { self.absorb(deficit) } else { 0 };
        if unabsorbed > 0 {
            tracing::debug!(
                stockroom = %self.key.stockroom,
                item = %self.key.item,
                unabsorbed,
                "negative lot remainder exceeds remaining lots"
            );
        }

        self.quantity += net;
        LotApplyOutcome { net, unabsorbed }
    }

    fn absorb(&mut self, mut deficit: i64) -> i64 {
        for lot in self.lots.iter_mut() {
            if deficit == 0 {
                break;
            }
            let take = lot.quantity.min(deficit);
            lot.quantity -= take;
            deficit -= take;
        }
        self.lots.retain(|l| l.quantity > 0);
        deficit
    }

    /// Stamp the aggregate as persisted: assign identities to unsaved lots (in
    /// canonical order) and record the stored version.
    pub fn mark_persisted(&mut self, version: u64, mut next_lot_id: impl FnMut() -> LotId) {
        for lot in self.lots.iter_mut().filter(|l| l.id.is_none()) {
            lot.id = Some(next_lot_id());
        }
        self.version = version;
    }
}

impl AggregateRoot for ItemStock {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}
