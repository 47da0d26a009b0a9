//! Estado durable por step.

mod key;
mod store;

pub use key::{StateKey, StateScope};
pub use store::{InMemoryStateStore, StateStore, StateStoreExt};
