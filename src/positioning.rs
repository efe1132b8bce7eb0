//! Positioning Operations
//!
//! Pure dense-position arithmetic for ordered sibling lists. Positions are
//! always the zero-based index of an entry in its container; nothing here
//! touches the store or the network.

use crate::models::{Card, Column};

/// Anything that carries a dense `position` within its container
pub trait Positioned {
    fn position(&self) -> i32;
    fn set_position(&mut self, position: i32);
}

impl Positioned for Card {
    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

impl Positioned for Column {
    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

/// Reindex entries to be sequential (0, 1, 2, ...) in their current order
pub fn reindex<T: Positioned>(entries: &mut [T]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.set_position(index as i32);
    }
}

/// True when positions are exactly 0..len in order
pub fn is_dense<T: Positioned>(entries: &[T]) -> bool {
    entries
        .iter()
        .enumerate()
        .all(|(index, entry)| entry.position() == index as i32)
}

/// Where the moved item should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination<'a, Id> {
    /// Same container; the index is interpreted after the item was removed
    Within(usize),
    /// Another container's current ordering plus the insertion index
    Into(&'a [Id], usize),
}

/// Complete new ordering of both affected containers. Each entry's position
/// is its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation<Id> {
    pub moved: Id,
    /// Source container after the move (for `Within`, the only container)
    pub source: Vec<Id>,
    /// Destination container after the move; `None` for same-container moves
    pub destination: Option<Vec<Id>>,
    /// Final position of the moved item in its destination
    pub position: usize,
}

impl<Id: Copy> Allocation<Id> {
    /// Ordering of the container the item ended up in
    pub fn landing(&self) -> &[Id] {
        self.destination.as_deref().unwrap_or(&self.source)
    }

    /// `(id, position)` pairs of the source container
    pub fn source_positions(&self) -> impl Iterator<Item = (Id, i32)> + '_ {
        dense_positions(&self.source)
    }

    /// `(id, position)` pairs of the destination container, if different
    pub fn destination_positions(&self) -> impl Iterator<Item = (Id, i32)> + '_ {
        self.destination.iter().flat_map(|d| dense_positions(d))
    }
}

/// `(id, index)` pairs for an ordered list
pub fn dense_positions<Id: Copy>(ids: &[Id]) -> impl Iterator<Item = (Id, i32)> + '_ {
    ids.iter().enumerate().map(|(index, id)| (*id, index as i32))
}

/// Compute the orderings that result from moving `source[from]` to `to`.
///
/// Returns `None` when the move is a no-op (own slot) or `from` is out of
/// range. Indices past the end of the destination append.
pub fn allocate<Id: Copy + Eq>(source: &[Id], from: usize, to: Destination<'_, Id>) -> Option<Allocation<Id>> {
    let moved = *source.get(from)?;
    let mut remaining: Vec<Id> = source.to_vec();
    remaining.remove(from);

    match to {
        Destination::Within(index) => {
            let index = index.min(remaining.len());
            if index == from {
                return None;
            }
            remaining.insert(index, moved);
            Some(Allocation { moved, source: remaining, destination: None, position: index })
        }
        Destination::Into(siblings, index) => {
            let mut destination: Vec<Id> = siblings.iter().copied().filter(|id| *id != moved).collect();
            let index = index.min(destination.len());
            destination.insert(index, moved);
            Some(Allocation { moved, source: remaining, destination: Some(destination), position: index })
        }
    }
}

/// Same-container move of a whole id list; `None` when nothing changes
pub fn reorder<Id: Copy + Eq>(ids: &[Id], from: usize, to: usize) -> Option<Vec<Id>> {
    allocate(ids, from, Destination::Within(to)).map(|a| a.source)
}
