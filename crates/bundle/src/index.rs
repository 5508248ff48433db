//! Descriptor arena backing both the live index and the trash.
//!
//! Every descriptor lives in one slot vector, tagged [`SlotState::Live`] or
//! [`SlotState::Trashed`]. The path map only ever points at live slots, so
//! compaction walks a single structure and there are no parallel copies of a
//! descriptor to go stale.

use std::collections::HashMap;
use std::ops::Range;
use std::time::SystemTime;

/// Metadata for one stored asset.
///
/// Descriptors are plain values: updates build a new descriptor and replace
/// the slot contents rather than mutating through a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Last write time (millisecond precision).
    pub time: SystemTime,
    /// Absolute byte offset of the payload in the bundle file.
    pub offset: u64,
    /// Logical payload length.
    pub length: u64,
    /// Physically reserved bytes; `allocated_size >= length`.
    pub allocated_size: u64,
}

impl Descriptor {
    /// Exclusive end of the physical range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.allocated_size
    }

    /// Bytes reserved beyond the logical length.
    #[must_use]
    pub fn slack(&self) -> u64 {
        self.allocated_size - self.length
    }

    /// Slack-fit test: the existing slot can hold `length` bytes in place
    /// when `length <= allocated_size <= length + reserve`.
    #[must_use]
    pub fn fits_in_place(&self, length: u64, reserve: u64) -> bool {
        self.allocated_size >= length && self.allocated_size <= length.saturating_add(reserve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Live,
    Trashed,
}

#[derive(Debug, Clone)]
struct Slot {
    path: String,
    descriptor: Descriptor,
    state: SlotState,
}

#[derive(Debug, Default)]
pub(crate) struct Index {
    slots: Vec<Slot>,
    live: HashMap<String, usize>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Descriptor> {
        self.live.get(path).map(|&id| &self.slots[id].descriptor)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.live.contains_key(path)
    }

    /// Adds a new live descriptor. Returns `false` (and changes nothing) if
    /// `path` already has one; callers trash the old slot first.
    pub fn insert(&mut self, path: String, descriptor: Descriptor) -> bool {
        if self.live.contains_key(&path) {
            return false;
        }
        let id = self.slots.len();
        self.slots.push(Slot {
            path: path.clone(),
            descriptor,
            state: SlotState::Live,
        });
        self.live.insert(path, id);
        true
    }

    /// Replaces the descriptor of a live slot. Returns `false` if `path` is absent.
    pub fn replace(&mut self, path: &str, descriptor: Descriptor) -> bool {
        match self.live.get(path) {
            Some(&id) => {
                self.slots[id].descriptor = descriptor;
                true
            }
            None => false,
        }
    }

    /// Moves the live descriptor for `path` to the trash, returning it.
    pub fn trash(&mut self, path: &str) -> Option<Descriptor> {
        let id = self.live.remove(path)?;
        let slot = &mut self.slots[id];
        slot.state = SlotState::Trashed;
        Some(slot.descriptor)
    }

    /// Live `(path, descriptor)` pairs in slot order.
    pub fn live(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Live)
            .map(|s| (s.path.as_str(), &s.descriptor))
    }

    pub fn trashed(&self) -> impl Iterator<Item = &Descriptor> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Trashed)
            .map(|s| &s.descriptor)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn trashed_len(&self) -> usize {
        self.slots.len() - self.live.len()
    }

    /// Shifts live descriptors left after compaction moved their bytes.
    ///
    /// `moves` lists each moved block with its leftward shift, in ascending
    /// and non-overlapping order, using pre-move offsets. A descriptor
    /// belongs to the block containing its offset. Zero-sized descriptors
    /// sitting exactly on a block's end move with that block: they own no
    /// bytes of the following hole and would otherwise be skipped.
    ///
    /// Live slots are sorted by offset once and swept together with
    /// `moves`, so the cost is O(N log N + T) for N live slots and T blocks.
    pub fn rebase(&mut self, moves: &[(Range<u64>, u64)]) {
        let mut order: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Live)
            .map(|(id, _)| id)
            .collect();
        // empty descriptors first on a shared offset, so they still see the
        // block they close before a sized one moves the cursor past it
        order.sort_by_key(|&id| {
            let d = &self.slots[id].descriptor;
            (d.offset, d.allocated_size)
        });

        let mut next = 0;
        for id in order {
            let d = self.slots[id].descriptor;
            while let Some((block, _)) = moves.get(next) {
                let past = d.offset > block.end
                    || (d.offset == block.end && d.allocated_size > 0);
                if !past {
                    break;
                }
                next += 1;
            }
            let Some((block, delta)) = moves.get(next) else {
                break;
            };
            if block.contains(&d.offset) || d.offset == block.end {
                self.slots[id].descriptor = Descriptor {
                    offset: d.offset - delta,
                    ..d
                };
            }
        }
    }

    /// Drops every trashed slot and renumbers the live ones.
    pub fn purge_trash(&mut self) {
        self.slots.retain(|s| s.state == SlotState::Live);
        self.live = self
            .slots
            .iter()
            .enumerate()
            .map(|(id, s)| (s.path.clone(), id))
            .collect();
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.live.clear();
    }
}
