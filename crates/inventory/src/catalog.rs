use serde::{Deserialize, Serialize};

use stockops_core::{Entity, ItemId, LocationId, StockroomId};

/// A trackable good.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Lots of this item must carry an expiration date.
    pub has_expiration: bool,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            has_expiration: false,
        }
    }

    pub fn expirable(name: impl Into<String>) -> Self {
        Self {
            has_expiration: true,
            ..Self::new(name)
        }
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A physical or logical location holding item quantities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stockroom {
    pub id: StockroomId,
    pub name: String,
    pub location: Option<LocationId>,
}

impl Stockroom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StockroomId::new(),
            name: name.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }
}

impl Entity for Stockroom {
    type Id = StockroomId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
