use std::collections::BTreeMap;
use std::fmt;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Item categories that can be stockpiled by a block.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Copper,
    Lead,
    Metaglass,
    Graphite,
    Silicon,
    Titanium,
    Thorium,
    Plastanium,
}

impl ItemKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "copper" => Some(ItemKind::Copper),
            "lead" => Some(ItemKind::Lead),
            "metaglass" => Some(ItemKind::Metaglass),
            "graphite" => Some(ItemKind::Graphite),
            "silicon" => Some(ItemKind::Silicon),
            "titanium" => Some(ItemKind::Titanium),
            "thorium" => Some(ItemKind::Thorium),
            "plastanium" => Some(ItemKind::Plastanium),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Copper => "copper",
            ItemKind::Lead => "lead",
            ItemKind::Metaglass => "metaglass",
            ItemKind::Graphite => "graphite",
            ItemKind::Silicon => "silicon",
            ItemKind::Titanium => "titanium",
            ItemKind::Thorium => "thorium",
            ItemKind::Plastanium => "plastanium",
        };
        f.write_str(name)
    }
}

/// Read/write view over a block's item storage.
pub trait ResourceLedger {
    fn get(&self, kind: ItemKind) -> u32;

    fn remove(&mut self, kind: ItemKind, amount: u32);

    fn has(&self, kind: ItemKind, amount: u32) -> bool {
        self.get(kind) >= amount
    }
}

/// Item storage attached to a block entity.
#[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemLedger {
    items: BTreeMap<ItemKind, u32>,
}

impl ItemLedger {
    pub fn with_items(items: impl IntoIterator<Item = (ItemKind, u32)>) -> Self {
        let mut ledger = Self::default();
        for (kind, amount) in items {
            ledger.add(kind, amount);
        }
        ledger
    }

    pub fn add(&mut self, kind: ItemKind, amount: u32) {
        if amount == 0 {
            return;
        }
        let slot = self.items.entry(kind).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    pub fn total(&self) -> u64 {
        self.items.values().map(|amount| *amount as u64).sum()
    }
}

impl ResourceLedger for ItemLedger {
    fn get(&self, kind: ItemKind) -> u32 {
        self.items.get(&kind).copied().unwrap_or(0)
    }

    fn remove(&mut self, kind: ItemKind, amount: u32) {
        if let Some(slot) = self.items.get_mut(&kind) {
            *slot = slot.saturating_sub(amount);
            if *slot == 0 {
                self.items.remove(&kind);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemKind,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item: ItemKind, amount: u32) -> Self {
        Self { item, amount }
    }
}

/// Ordered item cost of one production cycle. Shared read-only by every
/// factory of the same type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionRequirement {
    stacks: Vec<ItemStack>,
}

impl ProductionRequirement {
    pub fn new(stacks: Vec<ItemStack>) -> Self {
        Self { stacks }
    }

    pub fn stacks(&self) -> &[ItemStack] {
        &self.stacks
    }

    pub fn required(&self, kind: ItemKind) -> Option<u32> {
        self.stacks
            .iter()
            .find(|stack| stack.item == kind)
            .map(|stack| stack.amount)
    }

    /// Whether the ledger covers the share of each stack matching `fraction`
    /// of the cycle, rounded down.
    pub fn satisfied_at<L: ResourceLedger + ?Sized>(&self, ledger: &L, fraction: f32) -> bool {
        self.stacks.iter().all(|stack| {
            let needed = (fraction * stack.amount as f32) as u32;
            ledger.has(stack.item, needed)
        })
    }

    /// Removes one full cycle's worth of every stack.
    pub fn consume<L: ResourceLedger + ?Sized>(&self, ledger: &mut L) {
        for stack in &self.stacks {
            ledger.remove(stack.item, stack.amount);
        }
    }

    /// Transport acceptance: required kinds are accepted while the stock is
    /// below twice the per-cycle amount. The incoming amount does not matter.
    pub fn accept_item<L: ResourceLedger + ?Sized>(&self, ledger: &L, kind: ItemKind) -> bool {
        self.required(kind)
            .is_some_and(|amount| ledger.get(kind) < amount.saturating_mul(2))
    }

    pub fn max_accepted(&self, kind: ItemKind) -> u32 {
        self.required(kind)
            .map(|amount| amount.saturating_mul(2))
            .unwrap_or(0)
    }

    /// Moves up to `amount` items of `kind` into the ledger, bounded by
    /// [`Self::max_accepted`]. Returns how many were taken.
    pub fn deposit(&self, ledger: &mut ItemLedger, kind: ItemKind, amount: u32) -> u32 {
        if !self.accept_item(ledger, kind) {
            return 0;
        }
        let room = self.max_accepted(kind).saturating_sub(ledger.get(kind));
        let accepted = amount.min(room);
        ledger.add(kind, accepted);
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> ProductionRequirement {
        ProductionRequirement::new(vec![
            ItemStack::new(ItemKind::Silicon, 10),
            ItemStack::new(ItemKind::Lead, 4),
        ])
    }

    #[test]
    fn partial_progress_needs_partial_stock() {
        let req = requirement();
        let ledger = ItemLedger::with_items([(ItemKind::Silicon, 5), (ItemKind::Lead, 2)]);
        assert!(req.satisfied_at(&ledger, 0.0));
        assert!(req.satisfied_at(&ledger, 0.5));
        // floor(0.6 * 10) = 6 silicon
        assert!(!req.satisfied_at(&ledger, 0.6));
    }

    #[test]
    fn consume_removes_full_stacks() {
        let req = requirement();
        let mut ledger = ItemLedger::with_items([(ItemKind::Silicon, 12), (ItemKind::Lead, 4)]);
        req.consume(&mut ledger);
        assert_eq!(ledger.get(ItemKind::Silicon), 2);
        assert_eq!(ledger.get(ItemKind::Lead), 0);
    }

    #[test]
    fn acceptance_caps_at_double_the_stack() {
        let req = requirement();
        let mut ledger = ItemLedger::with_items([(ItemKind::Silicon, 19)]);
        assert!(req.accept_item(&ledger, ItemKind::Silicon));
        ledger.add(ItemKind::Silicon, 1);
        assert!(!req.accept_item(&ledger, ItemKind::Silicon));
        assert!(!req.accept_item(&ledger, ItemKind::Copper));
        assert_eq!(req.max_accepted(ItemKind::Silicon), 20);
        assert_eq!(req.max_accepted(ItemKind::Lead), 8);
        assert_eq!(req.max_accepted(ItemKind::Copper), 0);
    }

    #[test]
    fn deposit_clamps_to_remaining_room() {
        let req = requirement();
        let mut ledger = ItemLedger::with_items([(ItemKind::Lead, 6)]);
        assert_eq!(req.deposit(&mut ledger, ItemKind::Lead, 5), 2);
        assert_eq!(ledger.get(ItemKind::Lead), 8);
        assert_eq!(req.deposit(&mut ledger, ItemKind::Lead, 5), 0);
        assert_eq!(req.deposit(&mut ledger, ItemKind::Thorium, 5), 0);
    }

    #[test]
    fn item_names_parse_back() {
        for kind in [ItemKind::Copper, ItemKind::Silicon, ItemKind::Plastanium] {
            assert_eq!(ItemKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(ItemKind::parse("sand"), None);
    }
}
