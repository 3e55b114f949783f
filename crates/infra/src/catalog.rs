//! Item and stockroom lookup.
//!
//! Items and stockrooms are reference data for the engine; only the dispense
//! façade needs to look them up.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stockops_core::{Entity, ItemId, LocationId, StockroomId};
use stockops_inventory::{Item, Stockroom};

use crate::error::StoreError;

pub trait Catalog: Send + Sync {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    fn stockroom(&self, id: StockroomId) -> Result<Option<Stockroom>, StoreError>;

    /// Stockrooms at a location, ordered by name.
    fn stockrooms_at(&self, location: LocationId) -> Result<Vec<Stockroom>, StoreError>;
}

impl<S> Catalog for Arc<S>
where
    S: Catalog + ?Sized,
{
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(id)
    }

    fn stockroom(&self, id: StockroomId) -> Result<Option<Stockroom>, StoreError> {
        (**self).stockroom(id)
    }

    fn stockrooms_at(&self, location: LocationId) -> Result<Vec<Stockroom>, StoreError> {
        (**self).stockrooms_at(location)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<ItemId, Item>>,
    stockrooms: RwLock<HashMap<StockroomId, Stockroom>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&self, item: Item) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;
        items.insert(*Entity::id(&item), item);
        Ok(())
    }

    pub fn add_stockroom(&self, stockroom: Stockroom) -> Result<(), StoreError> {
        let mut stockrooms = self.stockrooms.write().map_err(|_| StoreError::Poisoned)?;
        stockrooms.insert(*Entity::id(&stockroom), stockroom);
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(&id).cloned())
    }

    fn stockroom(&self, id: StockroomId) -> Result<Option<Stockroom>, StoreError> {
        let stockrooms = self.stockrooms.read().map_err(|_| StoreError::Poisoned)?;
        Ok(stockrooms.get(&id).cloned())
    }

    fn stockrooms_at(&self, location: LocationId) -> Result<Vec<Stockroom>, StoreError> {
        let stockrooms = self.stockrooms.read().map_err(|_| StoreError::Poisoned)?;
        let mut found: Vec<Stockroom> = stockrooms
            .values()
            .filter(|s| s.location == Some(location))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}
