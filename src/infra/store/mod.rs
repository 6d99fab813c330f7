//! Object caches and the informers that fill them.

pub mod informer;
pub mod memory;

pub use informer::InMemoryInformer;
pub use memory::InMemoryStore;
