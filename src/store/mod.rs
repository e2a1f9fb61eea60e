//! The reversible store underlying backtracking.
//!
//! Every reversible scalar of a problem (domain presence bits, domain bounds,
//! unary costs, per-function cost deltas, connection flags, the lower and
//! upper bound) is a slot in one [`Store`]. Mutations record the previous
//! value on a trail; [`Store::restore`] replays the trail in reverse down to a
//! previously opened frame. Restoring is O(number of changes since the target
//! frame was opened), it never walks untouched slots.

use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;

/// Key of one reversible `i64` slot in the [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInt {
    id: u32,
}

impl StorageKey for StateInt {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        StateInt { id: index as u32 }
    }
}

#[derive(Debug, Clone, Copy)]
struct StateChange {
    slot: StateInt,
    old_value: i64,
}

/// Trailed stack of primitive slot changes with depth-based restore.
#[derive(Default, Debug, Clone)]
pub struct Store {
    /// At index d is the trail length at which depth d + 1 was opened.
    frames: Vec<usize>,
    trail: Vec<StateChange>,
    values: KeyedVec<StateInt, i64>,
}

impl Store {
    /// Allocate a fresh reversible slot holding `initial_value`.
    ///
    /// Slots are registered while the problem is loaded; registration at a
    /// depth greater than zero is a logic error.
    pub fn register(&mut self, initial_value: i64) -> StateInt {
        calabash_assert_simple!(
            self.depth() == 0,
            "reversible slots are registered before search starts"
        );
        self.values.push(initial_value)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Open a new frame. Changes made from now on are undone by restoring to
    /// the depth that was current before this call.
    pub fn store_frame(&mut self) {
        self.frames.push(self.trail.len());
    }

    /// Pop frames until the current depth equals `depth`, replaying each
    /// trailed entry to restore the previous value of its slot.
    pub fn restore(&mut self, depth: usize) {
        calabash_assert_simple!(depth <= self.depth());
        if depth == self.depth() {
            return;
        }

        let target_len = self.frames[depth];
        self.frames.truncate(depth);
        for change in self.trail.drain(target_len..).rev() {
            self.values[change.slot] = change.old_value;
        }
    }

    pub fn get(&self, slot: StateInt) -> i64 {
        self.values[slot]
    }

    /// Write `value` into `slot`, trailing the previous value. Writing the
    /// value already held is not trailed.
    pub fn set(&mut self, slot: StateInt, value: i64) {
        let old_value = self.values[slot];
        if old_value == value {
            return;
        }
        if self.depth() > 0 {
            self.trail.push(StateChange { slot, old_value });
        }
        self.values[slot] = value;
    }

    pub fn add(&mut self, slot: StateInt, addition: i64) {
        self.set(slot, self.values[slot] + addition);
    }
}

#[cfg(test)]
mod tests {
    use super::Store;

    #[test]
    fn restore_rewinds_to_the_pre_frame_state() {
        let mut store = Store::default();
        let a = store.register(3);
        let b = store.register(-1);

        store.store_frame();
        store.set(a, 10);
        store.add(b, 5);
        store.store_frame();
        store.set(a, 20);

        assert_eq!(store.get(a), 20);
        assert_eq!(store.get(b), 4);

        store.restore(1);
        assert_eq!(store.get(a), 10);
        assert_eq!(store.get(b), 4);

        store.restore(0);
        assert_eq!(store.get(a), 3);
        assert_eq!(store.get(b), -1);
    }

    #[test]
    fn restore_skips_frames_nonchronologically() {
        let mut store = Store::default();
        let a = store.register(0);

        for depth in 1..=4 {
            store.store_frame();
            store.set(a, depth);
        }
        assert_eq!(store.depth(), 4);

        store.restore(1);
        assert_eq!(store.depth(), 1);
        assert_eq!(store.get(a), 1);
    }

    #[test]
    fn writes_of_the_held_value_are_not_trailed() {
        let mut store = Store::default();
        let a = store.register(7);

        store.store_frame();
        store.set(a, 7);
        store.set(a, 9);
        store.set(a, 7);
        store.restore(0);

        assert_eq!(store.get(a), 7);
    }

    #[test]
    fn restore_to_current_depth_is_a_noop() {
        let mut store = Store::default();
        let a = store.register(1);
        store.store_frame();
        store.set(a, 2);
        store.restore(1);
        assert_eq!(store.get(a), 2);
    }
}
