//! Client-side cache of server responses.
//!
//! Every entry belongs to one [`Tag`]. Mutations invalidate whole tags, and
//! subscribed views refetch the affected entries the next time they look.

mod entry;
mod store;
mod subscription;
mod tags;

#[cfg(test)]
pub(crate) mod testing;

pub use entry::FetchStatus;
pub use store::{Invalidations, ResourceCache};
pub use subscription::Subscription;
pub use tags::{Params, QueryKey, Tag};
