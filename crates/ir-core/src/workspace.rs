//! L4 allocation-free workspace: a shape-keyed map of reusable
//! buffers so a decode loop can run without touching the allocator.

use crate::error::Result;
use crate::shape::Shape;
use std::collections::HashMap;

struct Slot {
    data: Vec<f32>,
    shape: Shape,
}

/// Hands out zeroed `f32` buffers keyed by name, reusing the backing
/// allocation across calls whenever the requested shape matches what is
/// already stored under that key.
///
/// Every call to `get_or_create` zeroes the buffer before returning it —
/// this is a load-bearing part of the contract: callers may
/// not assume stale contents from a previous reuse, and kernels that write
/// less than the full buffer (e.g. a ragged last tile) still see clean
/// state in the untouched tail.
#[derive(Default)]
pub struct WorkspaceMap {
    slots: HashMap<String, Slot>,
}

impl WorkspaceMap {
    pub fn new() -> Self {
        WorkspaceMap { slots: HashMap::new() }
    }

    /// Returns a zeroed buffer of `shape.numel()` elements for `key`,
    /// reallocating only if `key` is new or its shape changed.
    pub fn get_or_create(&mut self, key: &str, shape: &Shape) -> Result<&mut [f32]> {
        let n = shape.numel();
        match self.slots.get(key) {
            Some(slot) if &slot.shape == shape => {}
            _ => {
                self.slots.insert(
                    key.to_string(),
                    Slot {
                        data: vec![0.0; n],
                        shape: shape.clone(),
                    },
                );
            }
        }
        let slot = self.slots.get_mut(key).expect("slot was just inserted or already present");
        slot.data.iter_mut().for_each(|v| *v = 0.0);
        Ok(slot.data.as_mut_slice())
    }

    /// Moves a zeroed buffer of `shape.numel()` elements for `key` out of the
    /// map by value instead of cloning it. If a matching slot is resident,
    /// its backing allocation is taken directly (`std::mem::take`) and the
    /// slot is left empty, so the caller ends up owning the same heap
    /// allocation the workspace held rather than a copy of it; a later
    /// `get_or_create`/`take` under the same key simply reallocates.
    pub fn take(&mut self, key: &str, shape: &Shape) -> Result<Vec<f32>> {
        let n = shape.numel();
        match self.slots.get_mut(key) {
            Some(slot) if &slot.shape == shape => {
                let mut data = std::mem::take(&mut slot.data);
                data.iter_mut().for_each(|v| *v = 0.0);
                Ok(data)
            }
            _ => Ok(vec![0.0; n]),
        }
    }

    /// Number of distinct keys currently resident.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every resident buffer, freeing their allocations.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_allocation_for_same_shape() {
        let mut ws = WorkspaceMap::new();
        {
            let buf = ws.get_or_create("hidden", &Shape::new(vec![2, 3])).unwrap();
            buf.copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        }
        let ptr_before = ws.slots.get("hidden").unwrap().data.as_ptr();
        let buf = ws.get_or_create("hidden", &Shape::new(vec![2, 3])).unwrap();
        let ptr_after = buf.as_ptr();
        assert_eq!(ptr_before, ptr_after);
    }

    #[test]
    fn zeros_on_every_reuse() {
        let mut ws = WorkspaceMap::new();
        {
            let buf = ws.get_or_create("scratch", &Shape::new(vec![4])).unwrap();
            buf.copy_from_slice(&[9.0, 9.0, 9.0, 9.0]);
        }
        let buf = ws.get_or_create("scratch", &Shape::new(vec![4])).unwrap();
        assert_eq!(buf, &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn reallocates_when_shape_changes() {
        let mut ws = WorkspaceMap::new();
        {
            let buf = ws.get_or_create("x", &Shape::new(vec![2])).unwrap();
            buf.copy_from_slice(&[1.0, 2.0]);
        }
        let buf = ws.get_or_create("x", &Shape::new(vec![3])).unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf, &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn take_moves_the_resident_allocation() {
        let mut ws = WorkspaceMap::new();
        let ptr_before = {
            let buf = ws.get_or_create("hidden", &Shape::new(vec![4])).unwrap();
            buf.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            buf.as_ptr()
        };
        let owned = ws.take("hidden", &Shape::new(vec![4])).unwrap();
        assert_eq!(owned.as_ptr(), ptr_before);
        assert_eq!(owned, vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn take_without_a_resident_slot_allocates_zeroed() {
        let mut ws = WorkspaceMap::new();
        let owned = ws.take("new", &Shape::new(vec![3])).unwrap();
        assert_eq!(owned, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let mut ws = WorkspaceMap::new();
        ws.get_or_create("a", &Shape::new(vec![2])).unwrap().copy_from_slice(&[1.0, 2.0]);
        ws.get_or_create("b", &Shape::new(vec![2])).unwrap().copy_from_slice(&[3.0, 4.0]);
        assert_eq!(ws.len(), 2);
    }
}
