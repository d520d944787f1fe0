//!
//! Shared facilities that processes contend for.
//!
//! All facility state lives inside the simulator kernel. The handles
//! exported here ([`Resource`], [`Store`]) only carry an id and a
//! [`SimContext`](crate::runtime::SimContext), so they can be cloned freely
//! and moved into processes.
//!

mod resource;
pub use self::resource::*;

mod store;
pub use self::store::*;

/// A simulation unique identifier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

/// A simulation unique identifier of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub(crate) usize);

/// The facility a blocked process waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Blocker {
    Resource(ResourceId),
    Store(StoreId),
}
