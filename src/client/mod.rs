//! Session, queries and mutations
//!
//! - `Session`: owns the store for one login and hands out queries
//! - `Query`: a view's handle on one cache key
//! - `MutationCoordinator`: commands that invalidate and refetch

mod loader;
mod mutation;
mod query;
mod session;

pub use loader::KeyLoader;
pub use mutation::MutationCoordinator;
pub use query::{FromCached, Query, QueryState};
pub use session::Session;
