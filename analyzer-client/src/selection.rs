//! Pairwise selection of past analyses for side-by-side comparison
//!
//! The pair holds at most two distinct analysis ids in slots A and B. What
//! happens when a third id is selected depends on [`ReplacementPolicy`]:
//!
//! | Policy | Third `select` | Slot assignment |
//! |--------|----------------|-----------------|
//! | `rotate` | drops the oldest id; survivor moves to A, newcomer goes to B | allowed |
//! | `explicit` | rejected with [`SelectOutcome::PairFull`] | required to replace |

use crate::model::{Analysis, PLACEHOLDER};
use serde::Deserialize;

/// Shown when `explicit` rejects a third selection
pub const PAIR_FULL: &str = "Both comparison slots are taken; replace A or B.";

/// Behavior when selecting a new id while both slots are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    #[default]
    Rotate,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    fn from_index(index: usize) -> Self {
        if index == 0 { Slot::A } else { Slot::B }
    }

    fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::A => write!(f, "A"),
            Slot::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Empty,
    OneSelected,
    PairSelected,
}

/// What a call to [`SelectionPair::select`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected(Slot),
    Deselected(Slot),
    Rotated { dropped: String },
    PairFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: String,
    stamp: u64,
}

/// Two-slot selection buffer
#[derive(Debug, Clone)]
pub struct SelectionPair {
    slots: [Option<Entry>; 2],
    policy: ReplacementPolicy,
    clock: u64,
}

impl SelectionPair {
    pub fn new(policy: ReplacementPolicy) -> Self {
        Self {
            slots: [None, None],
            policy,
            clock: 0,
        }
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    fn entry(&mut self, id: &str) -> Entry {
        self.clock += 1;
        Entry {
            id: id.to_string(),
            stamp: self.clock,
        }
    }

    fn stamp(&self, slot: Slot) -> u64 {
        self.slots[slot.index()].as_ref().map_or(0, |e| e.stamp)
    }

    /// Toggle `id` in the pair
    pub fn select(&mut self, id: &str) -> SelectOutcome {
        if let Some(slot) = self.slot_of(id) {
            self.slots[slot.index()] = None;
            return SelectOutcome::Deselected(slot);
        }

        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(self.entry(id));
            return SelectOutcome::Selected(Slot::from_index(index));
        }

        match self.policy {
            ReplacementPolicy::Explicit => SelectOutcome::PairFull,
            ReplacementPolicy::Rotate => {
                let oldest = if self.stamp(Slot::A) <= self.stamp(Slot::B) {
                    Slot::A
                } else {
                    Slot::B
                };
                let dropped = self.slots[oldest.index()]
                    .take()
                    .map(|e| e.id)
                    .unwrap_or_default();
                let survivor = self.slots[oldest.other().index()].take();
                let newest = self.entry(id);
                self.slots = [survivor, Some(newest)];
                SelectOutcome::Rotated { dropped }
            }
        }
    }

    /// Put `id` in `slot`, returning the id it displaced.
    ///
    /// If `id` already sits in the other slot it moves, leaving that slot empty.
    pub fn assign(&mut self, slot: Slot, id: &str) -> Option<String> {
        if self.get(slot) == Some(id) {
            return None;
        }
        if self.get(slot.other()) == Some(id) {
            self.slots[slot.other().index()] = None;
        }
        let entry = self.entry(id);
        self.slots[slot.index()]
            .replace(entry)
            .map(|previous| previous.id)
    }

    pub fn clear(&mut self) {
        self.slots = [None, None];
    }

    pub fn get(&self, slot: Slot) -> Option<&str> {
        self.slots[slot.index()].as_ref().map(|e| e.id.as_str())
    }

    pub fn slot_of(&self, id: &str) -> Option<Slot> {
        self.slots
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.id == id))
            .map(Slot::from_index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slot_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> PairState {
        match self.len() {
            0 => PairState::Empty,
            1 => PairState::OneSelected,
            _ => PairState::PairSelected,
        }
    }

    /// Side-by-side view, available once both slots are filled
    pub fn comparison(&self, analyses: &[Analysis]) -> Option<Comparison> {
        let (a, b) = (self.get(Slot::A)?, self.get(Slot::B)?);
        let side = |id: &str| {
            let record = analyses.iter().find(|an| an.id == id);
            ComparisonSide {
                id: id.to_string(),
                prompt: record
                    .map(Analysis::prompt_or_placeholder)
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                response: record
                    .map(Analysis::response_or_placeholder)
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                found: record.is_some(),
            }
        };
        Some(Comparison {
            a: side(a),
            b: side(b),
        })
    }
}

impl Default for SelectionPair {
    fn default() -> Self {
        Self::new(ReplacementPolicy::default())
    }
}

/// One column of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonSide {
    pub id: String,
    pub prompt: String,
    pub response: String,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub a: ComparisonSide,
    pub b: ComparisonSide,
}
