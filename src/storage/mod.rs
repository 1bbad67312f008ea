pub mod memory;

pub use memory::{MemoryConnection, MemoryStore};
