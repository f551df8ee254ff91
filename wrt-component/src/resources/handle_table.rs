//! A handle table is a generational arena in spirit: handle index is a
//! slot, and a slot is reused only once nothing still refers to it.

use super::{Representation, ResourceTypeId};
use crate::errors;
use crate::prelude::*;

/// One entry in a [`HandleTable`].
#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub representation: Representation,
    pub resource_type: ResourceTypeId,
    pub owned: bool,
    pub borrow_count: u32,
    pub dropped: bool,
    /// For a borrow entry (`owned == false`): the index of the owning
    /// entry in the same table whose `borrow_count` this entry holds.
    source_owner_idx: Option<u32>,
}

/// The handle table for a single resource type within a single instance.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: Vec<Option<HandleEntry>>,
    free_list: Vec<u32>,
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entry: HandleEntry) -> u32 {
        if let Some(idx) = self.free_list.pop() {
            self.entries[idx as usize] = Some(entry);
            idx
        } else {
            self.entries.push(Some(entry));
            (self.entries.len() - 1) as u32
        }
    }

    fn get(&self, idx: u32) -> Result<&HandleEntry> {
        self.entries
            .get(idx as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| errors::handle_out_of_range(idx))
    }

    fn get_mut(&mut self, idx: u32) -> Result<&mut HandleEntry> {
        self.entries
            .get_mut(idx as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| errors::handle_out_of_range(idx))
    }

    /// `canon resource.new`: owns a representation value, returns its index.
    pub fn new_own(&mut self, resource_type: ResourceTypeId, representation: Representation) -> u32 {
        self.insert(HandleEntry {
            representation,
            resource_type,
            owned: true,
            borrow_count: 0,
            dropped: false,
            source_owner_idx: None,
        })
    }

    /// Create a call-scoped borrow handle over an existing owned entry,
    /// incrementing that entry's active-borrow count.
    pub fn borrow(&mut self, idx: u32) -> Result<u32> {
        let owner = self.get(idx)?;
        if owner.dropped {
            return Err(errors::handle_use_after_drop(idx));
        }
        if !owner.owned {
            return Err(errors::handle_not_owned(idx));
        }
        let representation = owner.representation;
        let resource_type = owner.resource_type;
        self.get_mut(idx)?.borrow_count += 1;
        Ok(self.insert(HandleEntry {
            representation,
            resource_type,
            owned: false,
            borrow_count: 0,
            dropped: false,
            source_owner_idx: Some(idx),
        }))
    }

    /// Release a borrow handle created by [`Self::borrow`], decrementing
    /// the originating owned entry's active-borrow count. Always runs,
    /// even on call failure, per §5's ordering guarantees.
    pub fn release_borrow(&mut self, idx: u32) -> Result<()> {
        let entry = self.entries.get_mut(idx as usize).and_then(Option::take).ok_or_else(|| errors::handle_out_of_range(idx))?;
        self.free_list.push(idx);
        if let Some(owner_idx) = entry.source_owner_idx {
            if let Ok(owner) = self.get_mut(owner_idx) {
                owner.borrow_count = owner.borrow_count.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// `canon resource.drop`: requires `owned && borrow_count == 0`,
    /// marks the entry dropped and returns its representation so the
    /// caller can run the destructor, then reclaims the slot.
    pub fn drop_own(&mut self, idx: u32) -> Result<Representation> {
        let entry = self.get(idx)?;
        if !entry.owned {
            return Err(errors::handle_not_owned(idx));
        }
        if entry.dropped {
            return Err(errors::handle_use_after_drop(idx));
        }
        if entry.borrow_count > 0 {
            return Err(errors::drop_while_borrowed(idx));
        }
        let representation = entry.representation;
        self.entries[idx as usize] = None;
        self.free_list.push(idx);
        log_trace!("handle {idx} dropped");
        Ok(representation)
    }

    /// `canon resource.rep`: the representation of a live, owned handle.
    pub fn rep(&self, idx: u32) -> Result<Representation> {
        let entry = self.get(idx)?;
        if !entry.owned {
            return Err(errors::handle_not_owned(idx));
        }
        if entry.dropped {
            return Err(errors::handle_use_after_drop(idx));
        }
        Ok(entry.representation)
    }

    /// Lift an `own T` out of the table (moving ownership to the caller):
    /// fails if the entry is a borrow, is dropped, or has active borrows.
    pub fn lift_own(&mut self, idx: u32) -> Result<Representation> {
        let entry = self.get(idx)?;
        if !entry.owned {
            return Err(errors::handle_not_owned(idx));
        }
        if entry.dropped {
            return Err(errors::handle_use_after_drop(idx));
        }
        if entry.borrow_count > 0 {
            return Err(errors::own_lift_while_borrowed(idx));
        }
        let representation = entry.representation;
        self.entries[idx as usize] = None;
        self.free_list.push(idx);
        Ok(representation)
    }

    /// Current active-borrow count of an owned entry (used by tests and
    /// by the borrow-scope scenario S8).
    pub fn borrow_count(&self, idx: u32) -> Result<u32> {
        Ok(self.get(idx)?.borrow_count)
    }

    pub fn is_dropped(&self, idx: u32) -> Result<bool> {
        Ok(self.get(idx)?.dropped)
    }
}

/// All handle tables belonging to one instance, keyed by resource type.
#[derive(Debug, Default)]
pub struct HandleTableSet {
    tables: Map<ResourceTypeId, HandleTable>,
}

impl HandleTableSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_mut(&mut self, resource_type: ResourceTypeId) -> &mut HandleTable {
        self.tables.entry(resource_type).or_default()
    }

    pub fn table(&self, resource_type: ResourceTypeId) -> Option<&HandleTable> {
        self.tables.get(&resource_type)
    }
}
