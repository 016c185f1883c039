//! Fixed-capacity slot container backed by a cached record
//!
//! A container reads nothing when it is built. The first access loads the
//! owning record through the cache and copies every in-range item into the
//! slot array; that happens at most once per container, even when several
//! threads touch a fresh container at the same time. Items stored at a slot
//! outside `[0, capacity)` are dropped during hydration.
//!
//! Every write updates the slot array and the record's item list together and
//! marks the key dirty. A container is meant to have one writer at a time.

use crate::cache::{CacheEntry, ChestCache};
use chestvault_core::{EntityKey, Error, ItemStack, Record, Result, SlotIndex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

/// Slot count used when none is configured
pub const DEFAULT_CAPACITY: u16 = 27;

/// What a window or protocol layer needs to render and edit a container
/// without knowing how it is persisted.
pub trait ItemContainer {
    /// Number of slots
    fn capacity(&self) -> u16;

    /// Content of a slot
    fn get(&self, index: SlotIndex) -> Result<Option<ItemStack>>;

    /// Replace a slot's content, returning the previous content
    fn set(&self, index: SlotIndex, item: Option<ItemStack>) -> Result<Option<ItemStack>>;

    /// Empty a slot, returning the previous content
    fn remove(&self, index: SlotIndex) -> Result<Option<ItemStack>> {
        self.set(index, None)
    }

    /// Visit every slot in ascending index order
    fn for_each(&self, visitor: &mut dyn FnMut(SlotIndex, Option<&ItemStack>));
}

enum Binding {
    /// Writes go to the cached record and mark the key dirty
    Cached(Arc<ChestCache>),
    /// Private copy; writes never reach the cache or storage
    Detached,
}

struct Hydrated {
    record: CacheEntry,
    slots: Mutex<Vec<Option<ItemStack>>>,
}

impl Hydrated {
    fn from_record(record: CacheEntry, capacity: u16) -> Self {
        let mut slots = vec![None; usize::from(capacity)];

        for item in record.read().items.iter() {
            match slot_offset(item.slot, capacity) {
                Some(offset) => slots[offset] = Some(item.to_stack()),
                None => debug!(
                    slot = item.slot,
                    capacity, "Dropping stored item outside container range"
                ),
            }
        }

        Self {
            record,
            slots: Mutex::new(slots),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<ItemStack>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Slot view over one entity's record
pub struct SlotContainer {
    key: EntityKey,
    capacity: u16,
    binding: Binding,
    state: OnceLock<Hydrated>,
}

impl SlotContainer {
    /// Build a container over `key`'s record in `cache`. Capacity comes from
    /// the cache.
    pub fn new(cache: Arc<ChestCache>, key: EntityKey) -> Self {
        Self {
            key,
            capacity: cache.capacity(),
            binding: Binding::Cached(cache),
            state: OnceLock::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Whether the backing record has been loaded into the slot array
    pub fn is_hydrated(&self) -> bool {
        self.state.get().is_some()
    }

    /// Whether this container is a detached copy
    pub fn is_detached(&self) -> bool {
        matches!(self.binding, Binding::Detached)
    }

    /// Content of slot `index`
    pub fn get(&self, index: SlotIndex) -> Result<Option<ItemStack>> {
        let state = self.hydrated();
        let offset = self.check_index(index)?;
        Ok(state.slots()[offset].clone())
    }

    /// Replace slot `index`, returning what was there.
    ///
    /// The record keeps at most one entry per slot: the old entry is removed
    /// and a new one is stored only for a non-empty item.
    pub fn set(&self, index: SlotIndex, item: Option<ItemStack>) -> Result<Option<ItemStack>> {
        let state = self.hydrated();
        let offset = self.check_index(index)?;

        let previous = {
            let mut slots = state.slots();
            state.record.write().put_slot(index, item.as_ref());
            std::mem::replace(&mut slots[offset], item)
        };

        if let Binding::Cached(cache) = &self.binding {
            cache.mark_dirty(&self.key);
        }
        Ok(previous)
    }

    /// Empty slot `index`, returning what was there
    pub fn remove(&self, index: SlotIndex) -> Result<Option<ItemStack>> {
        self.set(index, None)
    }

    /// Visit every slot in ascending index order
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(SlotIndex, Option<&ItemStack>),
    {
        // Copied out so the visitor may call back into this container
        let slots = self.hydrated().slots().clone();
        for (offset, item) in slots.iter().enumerate() {
            visitor(offset as SlotIndex, item.as_ref());
        }
    }

    /// Occupied slots only, keyed by index
    pub fn slot_map(&self) -> BTreeMap<SlotIndex, ItemStack> {
        let mut map = BTreeMap::new();
        self.for_each(|index, item| {
            if let Some(item) = item {
                map.insert(index, item.clone());
            }
        });
        map
    }

    fn hydrated(&self) -> &Hydrated {
        self.state.get_or_init(|| {
            let record = match &self.binding {
                Binding::Cached(cache) => cache.load(&self.key),
                Binding::Detached => CacheEntry::new(Record::new(self.key)),
            };
            debug!(key = %self.key, "Hydrated slot container");
            Hydrated::from_record(record, self.capacity)
        })
    }

    fn check_index(&self, index: SlotIndex) -> Result<usize> {
        slot_offset(index, self.capacity).ok_or(Error::IndexOutOfRange {
            index,
            capacity: self.capacity,
        })
    }
}

/// Deep copy: the clone gets its own record and slot array and is detached
/// from the cache, so nothing written to it is ever persisted.
impl Clone for SlotContainer {
    fn clone(&self) -> Self {
        let source = self.hydrated();
        let (slots, record) = {
            let slots = source.slots();
            (slots.clone(), source.record.snapshot())
        };

        Self {
            key: self.key,
            capacity: self.capacity,
            binding: Binding::Detached,
            state: OnceLock::from(Hydrated {
                record: CacheEntry::new(record),
                slots: Mutex::new(slots),
            }),
        }
    }
}

impl ItemContainer for SlotContainer {
    fn capacity(&self) -> u16 {
        self.capacity
    }

    fn get(&self, index: SlotIndex) -> Result<Option<ItemStack>> {
        SlotContainer::get(self, index)
    }

    fn set(&self, index: SlotIndex, item: Option<ItemStack>) -> Result<Option<ItemStack>> {
        SlotContainer::set(self, index, item)
    }

    fn for_each(&self, visitor: &mut dyn FnMut(SlotIndex, Option<&ItemStack>)) {
        SlotContainer::for_each(self, visitor)
    }
}

impl fmt::Debug for SlotContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotContainer")
            .field("key", &self.key)
            .field("capacity", &self.capacity)
            .field("hydrated", &self.is_hydrated())
            .field("detached", &self.is_detached())
            .finish()
    }
}

fn slot_offset(index: SlotIndex, capacity: u16) -> Option<usize> {
    usize::try_from(index)
        .ok()
        .filter(|offset| *offset < usize::from(capacity))
}
