//! Descriptor cache keyed by record type and dialect.
//!
//! # Responsibility
//! - Build each `Table` at most once per (type, dialect) pair.
//! - Hand every caller the same shared instance afterwards.
//!
//! # Invariants
//! - Concurrent first requests for one key run a single construction; the
//!   other callers block on that key's cell and observe its result.
//! - The map lock is released before construction starts.
//! - Entries are never evicted.
//! - A failed construction is not cached; the next request retries.

use crate::model::dialect::Dialect;
use crate::model::meta::Model;
use crate::table::{MappingResult, Table};
use log::debug;
use once_cell::sync::OnceCell;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type CacheKey = (TypeId, Dialect);
type Slot = Arc<OnceCell<Arc<Table>>>;

/// Shared store of compiled table descriptors.
#[derive(Debug, Default)]
pub struct TableCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `T` under `dialect`, building it on first use.
    ///
    /// # Errors
    /// - Any `MappingError` raised while building the descriptor.
    pub fn get<T: Model>(&self, dialect: Dialect) -> MappingResult<Arc<Table>> {
        let slot = self.slot((TypeId::of::<T>(), dialect));
        let table = slot.get_or_try_init(|| {
            debug!(
                "event=cache_miss module=table status=start model={} dialect={}",
                type_name::<T>(),
                dialect
            );
            Table::from_info(&T::describe(), dialect).map(Arc::new)
        })?;
        Ok(Arc::clone(table))
    }

    /// Number of keys that have a slot, built or pending.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: CacheKey) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }
}
