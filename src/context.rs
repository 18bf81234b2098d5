//! Request contexts and the generation-checked table that owns them.
//!
//! Every submitted intent carries an [`OpHandle`] in its SQE user_data.
//! The handle names a slot and generation in the [`ContextTable`]; the
//! completion path redeems it for the owned [`RequestContext`]. A stale
//! generation means the context was already consumed, and the completion
//! is dropped instead of interpreted.

use std::os::fd::RawFd;

/// Kind of submitted intent, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Accept,
    Read,
    Write,
    Wakeup,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OpKind::Accept => "accept",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Wakeup => "wakeup",
        })
    }
}

/// Per-intent record, interpreted when its completion arrives.
///
/// A context lives exactly as long as its submitted operation. Read
/// buffers are not copied on the read-to-write transition: the response
/// is rendered into the read buffer, which then moves into the new
/// `Write` context and is released on write completion.
#[derive(Debug)]
pub enum RequestContext {
    /// Accept on the listening descriptor. Perpetually re-armed.
    Accept,
    /// Read armed against `descriptor` into `buffer`.
    Read { descriptor: RawFd, buffer: Vec<u8> },
    /// Write of `buffer` to `descriptor`.
    Write { descriptor: RawFd, buffer: Vec<u8> },
    /// Eventfd read used to wake the loop for shutdown.
    Wakeup,
}

impl RequestContext {
    pub fn kind(&self) -> OpKind {
        match self {
            RequestContext::Accept => OpKind::Accept,
            RequestContext::Read { .. } => OpKind::Read,
            RequestContext::Write { .. } => OpKind::Write,
            RequestContext::Wakeup => OpKind::Wakeup,
        }
    }

    /// The client descriptor owned through this context, if any.
    pub(crate) fn descriptor(&self) -> Option<RawFd> {
        match self {
            RequestContext::Read { descriptor, .. } | RequestContext::Write { descriptor, .. } => {
                Some(*descriptor)
            }
            RequestContext::Accept | RequestContext::Wakeup => None,
        }
    }
}

/// Handle to an in-flight context.
///
/// Layout (64-bit user_data):
/// ```text
/// Bits 63..32: generation
/// Bits 31..0:  slot index
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpHandle {
    slot: u32,
    generation: u32,
}

impl OpHandle {
    #[inline]
    pub fn raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.slot as u64
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        OpHandle {
            slot: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot {
    generation: u32,
    context: Option<RequestContext>,
}

/// Fixed-capacity slab of in-flight request contexts.
///
/// The free list gives O(1) allocation; the per-slot generation counter
/// invalidates handles the instant their context is consumed, so a
/// duplicate or late completion can never reach a recycled slot.
/// Capacity bounds total simultaneous intents.
pub(crate) struct ContextTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ContextTable {
    pub fn new(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            slots.push(Slot {
                generation: 0,
                context: None,
            });
        }
        // Reverse order so pop hands out the lowest index first.
        let free: Vec<u32> = (0..capacity).rev().collect();
        ContextTable { slots, free }
    }

    /// Store a context for a submitted intent. Returns `None` at capacity.
    pub fn insert(&mut self, context: RequestContext) -> Option<OpHandle> {
        let slot = self.free.pop()?;
        let entry = &mut self.slots[slot as usize];
        entry.context = Some(context);
        Some(OpHandle {
            slot,
            generation: entry.generation,
        })
    }

    /// Redeem a handle for its context, consuming the slot.
    ///
    /// Returns `None` for stale handles (generation mismatch) and for
    /// slots already consumed.
    pub fn take(&mut self, handle: OpHandle) -> Option<RequestContext> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let context = entry.context.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.slot);
        Some(context)
    }

    /// Number of contexts currently in flight.
    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Handles for every outstanding context, lowest slot first. Used at
    /// teardown to cancel whatever is still armed.
    pub fn handles(&self) -> Vec<OpHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.context.is_some())
            .map(|(index, slot)| OpHandle {
                slot: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Remove and return every outstanding context. Used at teardown.
    pub fn drain(&mut self) -> Vec<RequestContext> {
        let mut out = Vec::new();
        for slot in &mut self.slots {
            if let Some(context) = slot.context.take() {
                slot.generation = slot.generation.wrapping_add(1);
                out.push(context);
            }
        }
        self.free.clear();
        self.free.extend((0..self.slots.len() as u32).rev());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trip() {
        let handle = OpHandle {
            slot: 0x00AB_CDEF,
            generation: 0xDEAD_BEEF,
        };
        assert_eq!(OpHandle::from_raw(handle.raw()), handle);
    }

    #[test]
    fn insert_then_take() {
        let mut table = ContextTable::new(4);
        let handle = table.insert(RequestContext::Accept).unwrap();
        assert_eq!(table.in_flight(), 1);

        let context = table.take(handle).unwrap();
        assert_eq!(context.kind(), OpKind::Accept);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn double_take_is_stale() {
        let mut table = ContextTable::new(4);
        let handle = table.insert(RequestContext::Accept).unwrap();
        assert!(table.take(handle).is_some());
        assert!(table.take(handle).is_none());
    }

    #[test]
    fn recycled_slot_invalidates_old_handle() {
        let mut table = ContextTable::new(1);
        let first = table.insert(RequestContext::Accept).unwrap();
        assert!(table.take(first).is_some());

        let second = table
            .insert(RequestContext::Read {
                descriptor: 7,
                buffer: vec![0u8; 8],
            })
            .unwrap();
        // Same slot, new generation.
        assert!(table.take(first).is_none());
        let context = table.take(second).unwrap();
        assert_eq!(context.kind(), OpKind::Read);
    }

    #[test]
    fn capacity_bounds_in_flight() {
        let mut table = ContextTable::new(2);
        let a = table.insert(RequestContext::Accept).unwrap();
        let _b = table.insert(RequestContext::Accept).unwrap();
        assert!(table.insert(RequestContext::Accept).is_none());

        table.take(a).unwrap();
        assert!(table.insert(RequestContext::Accept).is_some());
    }

    #[test]
    fn handles_enumerates_outstanding_contexts() {
        let mut table = ContextTable::new(4);
        let a = table.insert(RequestContext::Accept).unwrap();
        let b = table.insert(RequestContext::Wakeup).unwrap();
        table.take(a).unwrap();

        assert_eq!(table.handles(), vec![b]);
    }

    #[test]
    fn drain_returns_outstanding_contexts() {
        let mut table = ContextTable::new(4);
        table.insert(RequestContext::Accept).unwrap();
        let handle = table
            .insert(RequestContext::Write {
                descriptor: 9,
                buffer: Vec::new(),
            })
            .unwrap();

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.in_flight(), 0);
        assert!(table.take(handle).is_none());
    }
}
