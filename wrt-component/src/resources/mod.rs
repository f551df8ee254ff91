//! Resource types and the per-instance, per-resource-type handle tables
//! that enforce own/borrow discipline (§4.5).

mod handle_table;

pub use handle_table::{HandleEntry, HandleTable, HandleTableSet};

use core::sync::atomic::{AtomicU64, Ordering};

/// A resource type's nominal identity. Two `ResourceType`s are the same
/// type iff they share an id — compared by identity, never structurally,
/// per §4.5's "Cross-instance ownership" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTypeId(u64);

static NEXT_RESOURCE_TYPE_ID: AtomicU64 = AtomicU64::new(1);

impl ResourceTypeId {
    /// Mint a fresh identity, distinct from every other one ever minted
    /// in this process.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_RESOURCE_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identity value, for diagnostics and `Display` only — never
    /// meaningful across processes.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ResourceTypeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The representation a `resource.new` call stores in a handle table
/// entry. Per the open question in §9, only `I32` representations are
/// supported; anything else is rejected at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    I32(i32),
}

/// A core function reference used as a resource destructor.
pub type DestructorFn = u32;

/// A nominal resource type: its identity, owning instance, native
/// representation shape, and optional destructor.
#[derive(Debug, Clone)]
pub struct ResourceType {
    pub id: ResourceTypeId,
    pub owner_instance: u32,
    pub destructor: Option<DestructorFn>,
}

impl ResourceType {
    #[must_use]
    pub fn new(owner_instance: u32, destructor: Option<DestructorFn>) -> Self {
        Self { id: ResourceTypeId::new(), owner_instance, destructor }
    }
}
