use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockops_core::{
    AggregateRoot, DomainError, DomainResult, InstitutionId, ItemId, OperationId, PatientId,
    StockroomId, TransactionId,
};

use crate::catalog::Item;
use crate::stock::{BatchOrigin, LotDelta, LotQualifier};

const MAX_OPERATION_NUMBER_LEN: usize = 255;

/// Stock operation status lifecycle.
///
/// `New -> Pending -> {Completed, Cancelled}`; `Rollback` is only reached
/// through a reversing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockOperationStatus {
    /// Being created, not yet submitted.
    New,
    /// Requested but not yet started.
    Requested,
    /// Started; reservations exist and may already be applied.
    Pending,
    /// Finished; pending transactions were applied.
    Completed,
    /// Cancelled; pending transactions were reversed.
    Cancelled,
    /// Rolled back; applied transactions were reversed.
    Rollback,
}

impl StockOperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rollback)
    }

    /// Whether an automatic "finish operation" sweep removes operations in this status.
    pub fn removed_by_auto_finish(self) -> bool {
        matches!(self, Self::Pending | Self::Cancelled)
    }

    /// Statuses from which a submit creates reservations.
    pub fn accepts_submit(self) -> bool {
        matches!(self, Self::New | Self::Requested)
    }
}

impl core::fmt::Display for StockOperationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Requested => "REQUESTED",
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Rollback => "ROLLBACK",
        };
        f.write_str(s)
    }
}

/// Category of stock movement. Each kind has one registered handler in the
/// engine; this enum only carries the static requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Receipt,
    Distribution,
    Transfer,
    Adjustment,
    Return,
    Disposal,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Receipt,
        OperationKind::Distribution,
        OperationKind::Transfer,
        OperationKind::Adjustment,
        OperationKind::Return,
        OperationKind::Disposal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Receipt => "Receipt",
            Self::Distribution => "Distribution",
            Self::Transfer => "Transfer",
            Self::Adjustment => "Adjustment",
            Self::Return => "Return",
            Self::Disposal => "Disposal",
        }
    }

    pub fn has_source(self) -> bool {
        matches!(self, Self::Distribution | Self::Transfer | Self::Adjustment | Self::Disposal)
    }

    pub fn has_destination(self) -> bool {
        matches!(self, Self::Receipt | Self::Transfer | Self::Return)
    }

    pub fn has_recipient(self) -> bool {
        matches!(self, Self::Distribution | Self::Return)
    }

    pub fn recipient_required(self) -> bool {
        matches!(self, Self::Distribution)
    }

    /// Requested quantities are signed deltas only for adjustments.
    pub fn allows_negative_quantity(self) -> bool {
        matches!(self, Self::Adjustment)
    }

    /// Reservation quantity for a requested quantity.
    ///
    /// Reservations against a source are expressed as the amount drawn from it,
    /// so an adjustment's signed delta is negated. `None` when the negation
    /// does not fit.
    pub fn reserved_quantity(self, requested: i64) -> Option<i64> {
        match self {
            Self::Adjustment => requested.checked_neg(),
            _ => Some(requested),
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Who receives the stock of a distribution or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Patient(PatientId),
    Institution(InstitutionId),
}

/// A requested line on an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationItem {
    pub item: Item,
    pub quantity: i64,
    pub expiration: Option<DateTime<Utc>>,
    pub batch: Option<BatchOrigin>,
    pub calculated_expiration: bool,
    pub calculated_batch: bool,
}

impl OperationItem {
    /// A request leaving lot choice to the resolver.
    pub fn new(item: Item, quantity: i64) -> Self {
        let calculated_expiration = item.has_expiration;
        Self {
            item,
            quantity,
            expiration: None,
            batch: None,
            calculated_expiration,
            calculated_batch: true,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self.calculated_expiration = false;
        self
    }

    /// Expirable item with no expiration and no request to calculate one.
    pub fn without_expiration(mut self) -> Self {
        self.expiration = None;
        self.calculated_expiration = false;
        self
    }

    pub fn with_batch(mut self, batch: BatchOrigin) -> Self {
        self.batch = Some(batch);
        self.calculated_batch = false;
        self
    }
}

/// A planned quantity change owned by an in-progress operation.
///
/// Positive quantities against a source are amounts drawn from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedTransaction {
    pub id: TransactionId,
    pub operation_id: OperationId,
    pub item: Item,
    pub quantity: i64,
    pub expiration: Option<DateTime<Utc>>,
    pub batch: Option<BatchOrigin>,
    /// The resolver must pick the expiration.
    pub calculated_expiration: bool,
    /// The resolver must pick the batch.
    pub calculated_batch: bool,
    /// Calculated flags of the lot this reservation resolved to.
    pub source_calculated_expiration: bool,
    pub source_calculated_batch: bool,
}

impl ReservedTransaction {
    pub fn from_item(operation_id: OperationId, item: &OperationItem, quantity: i64) -> Self {
        Self {
            id: TransactionId::new(),
            operation_id,
            item: item.item.clone(),
            quantity,
            expiration: item.expiration,
            batch: item.batch,
            calculated_expiration: item.calculated_expiration,
            calculated_batch: item.calculated_batch,
            source_calculated_expiration: item.calculated_expiration,
            source_calculated_batch: item.calculated_batch,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item.id
    }

    pub fn qualifier(&self) -> LotQualifier {
        LotQualifier::new(self.expiration, self.batch)
    }

    pub fn is_calculated(&self) -> bool {
        self.calculated_expiration || self.calculated_batch
    }

    /// Copy with a fresh identity and a different quantity.
    pub fn split(&self, quantity: i64) -> Self {
        Self {
            id: TransactionId::new(),
            quantity,
            ..self.clone()
        }
    }

    /// Build the ledger entry this reservation turns into.
    pub fn to_applied(&self, stockroom: StockroomId, quantity: i64) -> StockOperationTransaction {
        StockOperationTransaction {
            id: TransactionId::new(),
            operation_id: self.operation_id,
            reserved_id: Some(self.id),
            item: self.item.id,
            stockroom,
            quantity,
            expiration: self.expiration,
            batch: self.batch,
            calculated_expiration: self.source_calculated_expiration,
            calculated_batch: self.source_calculated_batch,
        }
    }
}

/// A finalized ledger delta, permanently attached to the operation that
/// created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperationTransaction {
    pub id: TransactionId,
    pub operation_id: OperationId,
    /// Reservation this entry was converted from, if any.
    pub reserved_id: Option<TransactionId>,
    pub item: ItemId,
    pub stockroom: StockroomId,
    pub quantity: i64,
    pub expiration: Option<DateTime<Utc>>,
    pub batch: Option<BatchOrigin>,
    pub calculated_expiration: bool,
    pub calculated_batch: bool,
}

impl StockOperationTransaction {
    pub fn qualifier(&self) -> LotQualifier {
        LotQualifier::new(self.expiration, self.batch)
    }

    pub fn lot_delta(&self) -> LotDelta {
        LotDelta {
            qualifier: self.qualifier(),
            quantity: self.quantity,
            calculated_expiration: self.calculated_expiration,
            calculated_batch: self.calculated_batch,
        }
    }
}

/// Aggregate root: StockOperation.
///
/// Owns its requested items, its reservations and its applied transactions.
/// Transactions point back at the operation by identity only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    id: OperationId,
    number: String,
    kind: OperationKind,
    status: StockOperationStatus,
    source: Option<StockroomId>,
    destination: Option<StockroomId>,
    recipient: Option<Recipient>,
    operation_date: DateTime<Utc>,
    items: Vec<OperationItem>,
    reserved: Vec<ReservedTransaction>,
    transactions: Vec<StockOperationTransaction>,
    version: u64,
}

impl StockOperation {
    pub fn new(kind: OperationKind, number: impl Into<String>, operation_date: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            number: number.into(),
            kind,
            status: StockOperationStatus::New,
            source: None,
            destination: None,
            recipient: None,
            operation_date,
            items: Vec::new(),
            reserved: Vec::new(),
            transactions: Vec::new(),
            version: 0,
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn with_source(mut self, stockroom: StockroomId) -> Self {
        self.source = Some(stockroom);
        self
    }

    pub fn with_destination(mut self, stockroom: StockroomId) -> Self {
        self.destination = Some(stockroom);
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_item(mut self, item: OperationItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_status(mut self, status: StockOperationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn id_typed(&self) -> OperationId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn status(&self) -> StockOperationStatus {
        self.status
    }

    pub fn set_status(&mut self, status: StockOperationStatus) {
        self.status = status;
    }

    pub fn source(&self) -> Option<StockroomId> {
        self.source
    }

    /// Source stockroom if this kind draws from one.
    pub fn effective_source(&self) -> Option<StockroomId> {
        self.source.filter(|_| self.kind.has_source())
    }

    pub fn destination(&self) -> Option<StockroomId> {
        self.destination
    }

    pub fn recipient(&self) -> Option<Recipient> {
        self.recipient
    }

    pub fn operation_date(&self) -> DateTime<Utc> {
        self.operation_date
    }

    /// This operation as the origin of the lots it creates.
    pub fn as_batch_origin(&self) -> BatchOrigin {
        BatchOrigin::new(self.id, self.operation_date)
    }

    pub fn items(&self) -> &[OperationItem] {
        &self.items
    }

    pub fn reserved(&self) -> &[ReservedTransaction] {
        &self.reserved
    }

    pub fn reserved_mut(&mut self) -> &mut Vec<ReservedTransaction> {
        &mut self.reserved
    }

    pub fn clear_reserved(&mut self) {
        self.reserved.clear();
    }

    pub fn transactions(&self) -> &[StockOperationTransaction] {
        &self.transactions
    }

    pub fn record_transaction(&mut self, tx: StockOperationTransaction) {
        self.transactions.push(tx);
    }

    pub fn has_transactions(&self) -> bool {
        !self.reserved.is_empty() || !self.transactions.is_empty()
    }

    pub fn mark_persisted(&mut self, version: u64) {
        self.version = version;
    }

    /// Check kind requirements and requested lines.
    pub fn validate(&self) -> DomainResult<()> {
        if self.number.trim().is_empty() {
            return Err(DomainError::validation("the operation number must be defined"));
        }
        if self.number.len() > MAX_OPERATION_NUMBER_LEN {
            return Err(DomainError::validation(
                "the operation number must be less than 256 characters",
            ));
        }

        let kind = self.kind;
        if kind.has_source() && self.source.is_none() {
            return Err(DomainError::validation(format!(
                "the operation type ({kind}) requires a source stockroom but one has not been defined"
            )));
        }
        if kind.has_destination() && self.destination.is_none() {
            return Err(DomainError::validation(format!(
                "the operation type ({kind}) requires a destination stockroom but one has not been defined"
            )));
        }
        if kind.recipient_required() && self.recipient.is_none() {
            return Err(DomainError::validation(format!(
                "the operation type ({kind}) requires a patient or institution but one has not been associated"
            )));
        }

        if self.items.is_empty() {
            return Err(DomainError::validation(
                "the operation must have at least one operation item defined",
            ));
        }
        for line in &self.items {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for item '{}' cannot be zero",
                    line.item.name
                )));
            }
            if line.quantity < 0 && !kind.allows_negative_quantity() {
                return Err(DomainError::validation(format!(
                    "quantity for item '{}' must be positive for {kind} operations",
                    line.item.name
                )));
            }
            if kind.reserved_quantity(line.quantity).is_none() {
                return Err(DomainError::validation(format!(
                    "quantity for item '{}' is out of range",
                    line.item.name
                )));
            }
        }

        Ok(())
    }

    /// Create one reservation per requested line.
    pub fn create_reservations(&mut self) -> DomainResult<()> {
        let id = self.id;
        let kind = self.kind;
        let created = self
            .items
            .iter()
            .map(|line| {
                kind.reserved_quantity(line.quantity)
                    .map(|quantity| ReservedTransaction::from_item(id, line, quantity))
                    .ok_or_else(|| {
                        DomainError::validation(format!(
                            "quantity for item '{}' is out of range",
                            line.item.name
                        ))
                    })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        self.reserved.extend(created);
        Ok(())
    }
}

impl AggregateRoot for StockOperation {
    type Id = OperationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution() -> StockOperation {
        StockOperation::new(OperationKind::Distribution, "D-1", Utc::now())
            .with_source(StockroomId::new())
            .with_recipient(Recipient::Patient(PatientId::new()))
            .with_item(OperationItem::new(Item::new("gauze"), 3))
    }

    #[test]
    fn valid_distribution_passes() {
        assert_eq!(distribution().validate(), Ok(()));
    }

    #[test]
    fn missing_source_is_rejected() {
        let op = StockOperation::new(OperationKind::Transfer, "T-1", Utc::now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), 1));
        match op.validate() {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("source stockroom")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_destination_is_rejected() {
        let op = StockOperation::new(OperationKind::Receipt, "R-1", Utc::now())
            .with_item(OperationItem::new(Item::new("gauze"), 1));
        assert!(matches!(op.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn missing_recipient_is_rejected_only_when_required() {
        let op = StockOperation::new(OperationKind::Distribution, "D-2", Utc::now())
            .with_source(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), 1));
        assert!(matches!(op.validate(), Err(DomainError::Validation(_))));

        let ret = StockOperation::new(OperationKind::Return, "RT-1", Utc::now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), 1));
        assert_eq!(ret.validate(), Ok(()));
    }

    #[test]
    fn empty_items_and_bad_numbers_are_rejected() {
        let no_items = StockOperation::new(OperationKind::Receipt, "R-2", Utc::now())
            .with_destination(StockroomId::new());
        assert!(matches!(no_items.validate(), Err(DomainError::Validation(_))));

        let long = StockOperation::new(OperationKind::Receipt, "x".repeat(256), Utc::now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), 1));
        assert!(matches!(long.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn negative_quantities_only_for_adjustments() {
        let receipt = StockOperation::new(OperationKind::Receipt, "R-3", Utc::now())
            .with_destination(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), -1));
        assert!(matches!(receipt.validate(), Err(DomainError::Validation(_))));

        let adjustment = StockOperation::new(OperationKind::Adjustment, "A-1", Utc::now())
            .with_source(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), -1));
        assert_eq!(adjustment.validate(), Ok(()));
    }

    #[test]
    fn adjustment_quantity_that_cannot_be_negated_is_rejected() {
        let mut adjustment = StockOperation::new(OperationKind::Adjustment, "A-3", Utc::now())
            .with_source(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), i64::MIN));
        assert!(matches!(adjustment.validate(), Err(DomainError::Validation(_))));
        assert!(matches!(adjustment.create_reservations(), Err(DomainError::Validation(_))));
        assert!(adjustment.reserved().is_empty());
    }

    #[test]
    fn reservations_copy_request_and_negate_adjustments() {
        let mut op = distribution();
        op.create_reservations().unwrap();
        assert_eq!(op.reserved().len(), 1);
        assert_eq!(op.reserved()[0].quantity, 3);
        assert_eq!(op.reserved()[0].operation_id, op.id_typed());
        assert!(op.reserved()[0].calculated_batch);

        let mut adj = StockOperation::new(OperationKind::Adjustment, "A-2", Utc::now())
            .with_source(StockroomId::new())
            .with_item(OperationItem::new(Item::new("gauze"), 4));
        adj.create_reservations().unwrap();
        assert_eq!(adj.reserved()[0].quantity, -4);
    }

    #[test]
    fn expirable_items_default_to_calculated_expiration() {
        let line = OperationItem::new(Item::expirable("vaccine"), 1);
        assert!(line.calculated_expiration);
        assert!(!line.with_expiration(Utc::now()).calculated_expiration);
    }

    #[test]
    fn effective_source_ignores_source_on_receipts() {
        let op = StockOperation::new(OperationKind::Receipt, "R-4", Utc::now()).with_source(StockroomId::new());
        assert_eq!(op.effective_source(), None);
        assert!(distribution().effective_source().is_some());
    }

    #[test]
    fn status_flags_and_wire_names() {
        assert!(StockOperationStatus::Completed.is_terminal());
        assert!(!StockOperationStatus::Pending.is_terminal());
        assert!(StockOperationStatus::Pending.removed_by_auto_finish());
        assert_eq!(
            serde_json::to_string(&StockOperationStatus::Rollback).unwrap(),
            "\"ROLLBACK\""
        );
    }

    #[test]
    fn split_keeps_qualifiers_with_new_identity() {
        let mut op = distribution();
        op.create_reservations().unwrap();
        let original = &op.reserved()[0];
        let split = original.split(1);
        assert_ne!(split.id, original.id);
        assert_eq!(split.quantity, 1);
        assert_eq!(split.qualifier(), original.qualifier());
    }
}
