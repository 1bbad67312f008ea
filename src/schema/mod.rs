// ============================================================================
// Schema Module
// ============================================================================
//
// Explicit per-type field tables. Each model describes its fields once
// (accessor/mutator pairs, store names, index kinds, relationship targets)
// and the resulting `ModelSchema` is registered in a `Registry` that is
// passed to the engine.
//
// ============================================================================

pub mod builder;
pub mod field;
pub mod model;
pub mod registry;

pub use builder::{ModelSchema, SchemaBuilder};
pub use field::{Cardinality, FieldDescriptor, FieldKind, FieldType, FieldValue, IndexKind};
pub use model::{Model, RecordRef, Shared, shared};
pub use registry::Registry;

#[cfg(test)]
pub(crate) mod fixtures;
