//! Persisted record types
//!
//! A [`Record`] is the full set of slot items stored for one entity. The item
//! list is sparse and unordered; the only structural rule is that it holds at
//! most one [`SlotItem`] per slot, which [`Record::put_slot`] maintains.

use serde::{Deserialize, Deserializer, Serialize};

use crate::EntityKey;

/// Slot position inside a container.
///
/// Signed so that out-of-range values in a persisted record still decode and
/// can be filtered out, instead of failing the whole record.
pub type SlotIndex = i32;

/// One occupied slot as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotItem {
    pub slot: SlotIndex,

    #[serde(default)]
    pub item_id: String,

    #[serde(default)]
    pub quantity: i32,
}

impl SlotItem {
    pub fn new(slot: SlotIndex, stack: &ItemStack) -> Self {
        Self {
            slot,
            item_id: stack.item_id.clone(),
            quantity: stack.quantity,
        }
    }

    /// The in-memory stack this entry describes
    pub fn to_stack(&self) -> ItemStack {
        ItemStack::new(self.item_id.clone(), self.quantity)
    }
}

/// Content of a single container slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: i32,
}

impl ItemStack {
    pub fn new(item_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Persisted slot contents for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Owner of the record. Older files call this field `uuid`.
    #[serde(alias = "uuid", default = "EntityKey::nil")]
    pub key: EntityKey,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<SlotItem>,
}

impl Record {
    /// Create an empty record for an entity
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            items: Vec::new(),
        }
    }

    /// Stored entry for a slot, if any
    pub fn item_at(&self, slot: SlotIndex) -> Option<&SlotItem> {
        self.items.iter().find(|item| item.slot == slot)
    }

    /// Replace whatever is stored at `slot` with `stack`.
    ///
    /// Every existing entry for the slot is removed first, then a new entry is
    /// appended only when `stack` is `Some`. Empty slots are never stored.
    pub fn put_slot(&mut self, slot: SlotIndex, stack: Option<&ItemStack>) {
        self.clear_slot(slot);

        if let Some(stack) = stack {
            self.items.push(SlotItem::new(slot, stack));
        }
    }

    /// Remove every entry stored for `slot`
    pub fn clear_slot(&mut self, slot: SlotIndex) {
        self.items.retain(|item| item.slot != slot);
    }

    /// Whether the record has no stored items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items ordered by slot, for display
    pub fn sorted_items(&self) -> Vec<&SlotItem> {
        let mut items: Vec<&SlotItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.slot);
        items
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<SlotItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SlotItem>>::deserialize(deserializer)?.unwrap_or_default())
}
