//! Dispense façade.
//!
//! Dispensing hands one item to a patient or institution in a single call: it
//! picks a stockroom, builds a distribution, then submits and completes it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use stockops_core::{ItemId, LocationId, StockroomId};
use stockops_inventory::{OperationItem, OperationKind, Recipient, StockOperation};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger_store::StockLedger;
use crate::lifecycle::StockOperationService;
use crate::operation_store::OperationStore;

/// Who is dispensing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub default_location: Option<LocationId>,
}

impl CallerContext {
    pub fn at(location: LocationId) -> Self {
        Self {
            default_location: Some(location),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseRequest {
    pub item: ItemId,
    pub quantity: i64,
    pub recipient: Recipient,
}

pub struct DispenseService<L, O, C> {
    engine: Arc<StockOperationService<L, O>>,
    catalog: C,
    config: EngineConfig,
}

impl<L, O, C> DispenseService<L, O, C>
where
    L: StockLedger + Clone,
    O: OperationStore,
    C: Catalog,
{
    pub fn new(engine: Arc<StockOperationService<L, O>>, catalog: C, config: EngineConfig) -> Self {
        Self {
            engine,
            catalog,
            config,
        }
    }

    /// Dispense and return the completed distribution.
    pub fn dispense(&self, caller: &CallerContext, request: &DispenseRequest) -> EngineResult<StockOperation> {
        if request.quantity <= 0 {
            return Err(EngineError::validation("dispensed quantity must be positive"));
        }

        let item = self.catalog.item(request.item)?.ok_or(EngineError::NotFound)?;
        let source = self.resolve_stockroom(caller, item.id)?;

        let operation = StockOperation::new(OperationKind::Distribution, String::new(), Utc::now());
        let number = format!("{}-{}", self.config.dispense_prefix, operation.id_typed());
        let mut operation = operation
            .with_number(number)
            .with_source(source)
            .with_recipient(request.recipient)
            .with_item(OperationItem::new(item, request.quantity));

        self.engine.submit(&mut operation)?;
        self.engine.complete(&mut operation)?;

        info!(
            operation = %operation.id_typed(),
            number = %operation.number(),
            stockroom = %source,
            item = %request.item,
            quantity = request.quantity,
            "item dispensed"
        );
        Ok(operation)
    }

    /// Dispense, logging any failure instead of returning it.
    pub fn dispense_item(&self, caller: &CallerContext, request: &DispenseRequest) -> bool {
        match self.dispense(caller, request) {
            Ok(_) => true,
            Err(error) => {
                warn!(item = %request.item, quantity = request.quantity, %error, "dispense failed");
                false
            }
        }
    }

    /// First stockroom (by name) at the caller's location that holds the item,
    /// otherwise the configured default.
    pub fn resolve_stockroom(&self, caller: &CallerContext, item: ItemId) -> EngineResult<StockroomId> {
        if let Some(location) = caller.default_location {
            for stockroom in self.catalog.stockrooms_at(location)? {
                if self.engine.quantity(stockroom.id, item)? > 0 {
                    return Ok(stockroom.id);
                }
            }
            warn!(
                location = %location,
                item = %item,
                fallback = ?self.config.default_stockroom,
                "no stockroom at the caller's location holds the item; using the default stockroom"
            );
        }

        let fallback = self.config.default_stockroom.ok_or_else(|| {
            EngineError::validation(format!("no stockroom could be found to dispense item {item}"))
        })?;
        match self.catalog.stockroom(fallback)? {
            Some(stockroom) => Ok(stockroom.id),
            None => Err(EngineError::validation(format!(
                "default stockroom {fallback} is not in the catalog"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockops_core::PatientId;
    use stockops_inventory::{Item, Stockroom};

    use crate::catalog::InMemoryCatalog;
    use crate::ledger_store::InMemoryStockLedger;
    use crate::operation_store::InMemoryOperationStore;

    type Engine = StockOperationService<Arc<InMemoryStockLedger>, InMemoryOperationStore>;

    struct Fixture {
        engine: Arc<Engine>,
        catalog: Arc<InMemoryCatalog>,
        item: Item,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = Arc::new(StockOperationService::new(
                Arc::new(InMemoryStockLedger::new()),
                InMemoryOperationStore::new(),
            ));
            let catalog = Arc::new(InMemoryCatalog::new());
            let item = Item::new("paracetamol");
            catalog.add_item(item.clone()).unwrap();
            Self { engine, catalog, item }
        }

        fn stock(&self, stockroom: StockroomId, quantity: i64) {
            let mut receipt = StockOperation::new(OperationKind::Receipt, format!("R-{stockroom}"), Utc::now())
                .with_destination(stockroom)
                .with_item(OperationItem::new(self.item.clone(), quantity));
            self.engine.submit(&mut receipt).unwrap();
            self.engine.complete(&mut receipt).unwrap();
        }

        fn registered_stockroom(&self, name: &str) -> StockroomId {
            let stockroom = Stockroom::new(name);
            self.catalog.add_stockroom(stockroom.clone()).unwrap();
            stockroom.id
        }

        fn service(&self, config: EngineConfig) -> DispenseService<Arc<InMemoryStockLedger>, InMemoryOperationStore, Arc<InMemoryCatalog>> {
            DispenseService::new(self.engine.clone(), self.catalog.clone(), config)
        }

        fn request(&self, quantity: i64) -> DispenseRequest {
            DispenseRequest {
                item: self.item.id,
                quantity,
                recipient: Recipient::Patient(PatientId::new()),
            }
        }
    }

    #[test]
    fn picks_first_stockroom_at_location_holding_the_item() {
        let fx = Fixture::new();
        let ward = LocationId::new();
        let empty = Stockroom::new("A cabinet").at(ward);
        let stocked = Stockroom::new("B pharmacy").at(ward);
        fx.catalog.add_stockroom(empty.clone()).unwrap();
        fx.catalog.add_stockroom(stocked.clone()).unwrap();
        fx.stock(stocked.id, 10);

        let svc = fx.service(EngineConfig::default());
        let op = svc.dispense(&CallerContext::at(ward), &fx.request(4)).unwrap();

        assert_eq!(op.source(), Some(stocked.id));
        assert!(op.number().starts_with("DISP-"));
        assert_eq!(fx.engine.quantity(stocked.id, fx.item.id).unwrap(), 6);
    }

    #[test]
    fn falls_back_to_configured_default() {
        let fx = Fixture::new();
        let fallback = fx.registered_stockroom("central store");
        fx.stock(fallback, 3);

        let svc = fx.service(EngineConfig::default().with_default_stockroom(fallback));
        let op = svc.dispense(&CallerContext::at(LocationId::new()), &fx.request(3)).unwrap();

        assert_eq!(op.source(), Some(fallback));
        assert_eq!(fx.engine.quantity(fallback, fx.item.id).unwrap(), 0);
    }

    #[test]
    fn dispense_item_reports_failures_as_false() {
        let fx = Fixture::new();
        let fallback = fx.registered_stockroom("central store");
        fx.stock(fallback, 1);
        let svc = fx.service(EngineConfig::default().with_default_stockroom(fallback));

        assert!(!svc.dispense_item(&CallerContext::default(), &fx.request(2)));
        assert!(!svc.dispense_item(&CallerContext::default(), &fx.request(0)));
        assert!(svc.dispense_item(&CallerContext::default(), &fx.request(1)));
    }

    #[test]
    fn no_stockroom_is_a_validation_error() {
        let fx = Fixture::new();
        let svc = fx.service(EngineConfig::default());
        assert!(matches!(
            svc.dispense(&CallerContext::default(), &fx.request(1)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn default_stockroom_missing_from_the_catalog_is_rejected() {
        let fx = Fixture::new();
        let unknown = StockroomId::new();
        fx.stock(unknown, 5);
        let svc = fx.service(EngineConfig::default().with_default_stockroom(unknown));

        assert!(matches!(
            svc.dispense(&CallerContext::default(), &fx.request(1)),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(fx.engine.quantity(unknown, fx.item.id).unwrap(), 5);
    }
}
