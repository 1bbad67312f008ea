use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, RwLock};
use crate::core::{DbError, Result};
use super::builder::SchemaBuilder;
use super::field::{FieldDescriptor, FieldValue};

/// A record type that can be saved, found and deleted.
///
/// Implementors describe their fields once through [`Model::schema`]; the
/// engine never inspects the struct any other way.
pub trait Model: Clone + Default + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn schema() -> SchemaBuilder<Self>;
}

/// A record with shared identity. Relationship fields hold these, so two
/// records referencing the same target see the same instance after a find.
pub type Shared<M> = Arc<RwLock<M>>;

pub fn shared<M: Model>(model: M) -> Shared<M> {
    Arc::new(RwLock::new(model))
}

/// Object-safe view of a `RwLock<M>` for the engine.
pub(crate) trait RecordCell: Send + Sync {
    fn id(&self) -> Result<String>;
    fn set_id(&self, id: String) -> Result<()>;
    fn read_field(&self, field: &FieldDescriptor) -> Result<FieldValue>;
    fn write_field(&self, field: &FieldDescriptor, value: FieldValue) -> Result<()>;
    fn copy_from(&self, source: &RecordRef) -> Result<()>;
}

impl<M: Model> RecordCell for RwLock<M> {
    fn id(&self) -> Result<String> {
        Ok(self.read()?.id().to_string())
    }

    fn set_id(&self, id: String) -> Result<()> {
        self.write()?.set_id(id);
        Ok(())
    }

    fn read_field(&self, field: &FieldDescriptor) -> Result<FieldValue> {
        let guard = self.read()?;
        field.read(&*guard)
    }

    fn write_field(&self, field: &FieldDescriptor, value: FieldValue) -> Result<()> {
        let mut guard = self.write()?;
        field.write(&mut *guard, value)
    }

    fn copy_from(&self, source: &RecordRef) -> Result<()> {
        let source = source.downcast::<M>().ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "cannot copy a {} into a {}",
                source.type_name(),
                std::any::type_name::<M>()
            ))
        })?;
        if std::ptr::eq(self, &*source) {
            return Ok(());
        }
        let value = source.read()?.clone();
        *self.write()? = value;
        Ok(())
    }
}

/// Type-erased handle to a [`Shared`] record.
#[derive(Clone)]
pub struct RecordRef {
    cell: Arc<dyn RecordCell>,
    any: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl RecordRef {
    pub fn new<M: Model>(record: &Shared<M>) -> Self {
        Self {
            cell: record.clone(),
            any: record.clone(),
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }

    pub fn downcast<M: Model>(&self) -> Option<Shared<M>> {
        self.any.clone().downcast::<RwLock<M>>().ok()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }

    pub fn id(&self) -> Result<String> {
        self.cell.id()
    }

    pub fn set_id(&self, id: impl Into<String>) -> Result<()> {
        self.cell.set_id(id.into())
    }

    pub fn read_field(&self, field: &FieldDescriptor) -> Result<FieldValue> {
        self.cell.read_field(field)
    }

    pub fn write_field(&self, field: &FieldDescriptor, value: FieldValue) -> Result<()> {
        self.cell.write_field(field, value)
    }

    pub(crate) fn copy_from(&self, source: &RecordRef) -> Result<()> {
        self.cell.copy_from(source)
    }
}

impl<M: Model> From<&Shared<M>> for RecordRef {
    fn from(record: &Shared<M>) -> Self {
        Self::new(record)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
