//! Handle assignment and back-reference resolution.

use super::{ContentId, Handle};
use crate::error::{Error, Result};
use crate::stream::BASE_WIRE_HANDLE;
use std::collections::HashMap;
use tracing::debug;

/// Handle bindings that were live between two reset events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    entries: Vec<(Handle, ContentId)>,
}

impl Generation {
    /// Bindings in registration order
    pub fn entries(&self) -> &[(Handle, ContentId)] {
        &self.entries
    }

    /// Looks up one handle
    pub fn get(&self, handle: Handle) -> Option<ContentId> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|&(_, id)| id)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was registered in this generation
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The live handle table plus every generation retired by a reset
#[derive(Debug)]
pub struct HandleTable {
    next: i32,
    live: HashMap<Handle, ContentId>,
    order: Vec<Handle>,
    past: Vec<Generation>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Creates an empty table whose first handle is the base wire handle
    pub fn new() -> Self {
        Self {
            next: BASE_WIRE_HANDLE,
            live: HashMap::new(),
            order: Vec::new(),
            past: Vec::new(),
        }
    }

    /// Hands out the next handle of the current generation
    pub fn allocate(&mut self) -> Handle {
        let handle = Handle(self.next);
        self.next = self.next.wrapping_add(1);
        handle
    }

    /// Binds `handle` to `content` in the current generation
    pub fn register(&mut self, handle: Handle, content: ContentId) -> Result<()> {
        if self.live.contains_key(&handle) {
            return Err(Error::DuplicateHandle { handle });
        }
        self.live.insert(handle, content);
        self.order.push(handle);
        Ok(())
    }

    /// Resolves a handle of the current generation
    pub fn resolve(&self, handle: Handle) -> Result<ContentId> {
        self.live
            .get(&handle)
            .copied()
            .ok_or(Error::UnknownHandle { handle })
    }

    /// Retires the current generation (if non-empty) and restarts numbering
    pub fn reset(&mut self) {
        debug!("handle table reset ({} live handles)", self.live.len());
        if !self.live.is_empty() {
            let entries = self
                .order
                .drain(..)
                .filter_map(|h| self.live.get(&h).map(|&id| (h, id)))
                .collect();
            self.past.push(Generation { entries });
        }
        self.live.clear();
        self.order.clear();
        self.next = BASE_WIRE_HANDLE;
    }

    /// Generations retired so far
    pub fn generations(&self) -> &[Generation] {
        &self.past
    }

    /// Flushes the live generation and returns every generation
    pub fn into_generations(mut self) -> Vec<Generation> {
        self.reset();
        self.past
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_starts_at_base() {
        let mut table = HandleTable::new();
        assert_eq!(table.allocate(), Handle(0x7e0000));
        assert_eq!(table.allocate(), Handle(0x7e0001));
    }

    #[test]
    fn test_duplicate_register() {
        let mut table = HandleTable::new();
        let h = table.allocate();
        table.register(h, ContentId(0)).unwrap();
        let err = table.register(h, ContentId(1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateHandle { handle } if handle == h));
    }

    #[test]
    fn test_reset_starts_new_generation() {
        let mut table = HandleTable::new();
        let h = table.allocate();
        table.register(h, ContentId(7)).unwrap();
        assert_eq!(table.resolve(h).unwrap(), ContentId(7));

        table.reset();
        assert!(matches!(
            table.resolve(h),
            Err(Error::UnknownHandle { .. })
        ));
        assert_eq!(table.allocate(), Handle(0x7e0000));
        assert_eq!(table.generations().len(), 1);
        assert_eq!(table.generations()[0].get(h), Some(ContentId(7)));
    }

    #[test]
    fn test_empty_reset_records_nothing() {
        let mut table = HandleTable::new();
        table.reset();
        table.reset();
        assert!(table.generations().is_empty());
        assert!(table.into_generations().is_empty());
    }

    #[test]
    fn test_generation_keeps_registration_order() {
        let mut table = HandleTable::new();
        let a = table.allocate();
        let b = table.allocate();
        table.register(b, ContentId(1)).unwrap();
        table.register(a, ContentId(0)).unwrap();
        let gens = table.into_generations();
        assert_eq!(gens.len(), 1);
        assert_eq!(gens[0].entries(), &[(b, ContentId(1)), (a, ContentId(0))]);
    }
}
