//! In-process implementations of the queue and cache capabilities.

pub mod queue;
pub mod store;

pub use queue::WorkQueue;
pub use store::{InMemoryInformer, InMemoryStore};
