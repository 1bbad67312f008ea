use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use crate::core::{DbError, Result};
use super::builder::ModelSchema;
use super::model::{Model, RecordRef};

/// Model types known to a client, keyed both by Rust type and canonical name.
///
/// Built once at startup and shared read-only by every transaction.
#[derive(Debug, Default)]
pub struct Registry {
    by_type: HashMap<TypeId, Arc<ModelSchema>>,
    by_name: HashMap<String, TypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and registers the schema of `M`.
    pub fn register<M: Model>(&mut self) -> Result<Arc<ModelSchema>> {
        let schema = M::schema().build()?;

        if self.by_type.contains_key(&schema.type_id()) {
            return Err(DbError::InvalidSchema(format!(
                "type {} is already registered",
                schema.type_name()
            )));
        }
        if self.by_name.contains_key(schema.name()) {
            return Err(DbError::InvalidSchema(format!(
                "model name '{}' is already registered",
                schema.name()
            )));
        }

        let schema = Arc::new(schema);
        self.by_name
            .insert(schema.name().to_string(), schema.type_id());
        self.by_type.insert(schema.type_id(), Arc::clone(&schema));
        tracing::debug!(model = schema.name(), fields = schema.fields().len(), "registered model");
        Ok(schema)
    }

    /// Chaining form of [`Registry::register`].
    pub fn with<M: Model>(mut self) -> Result<Self> {
        self.register::<M>()?;
        Ok(self)
    }

    pub fn schema_of<M: Model>(&self) -> Result<Arc<ModelSchema>> {
        self.schema_by_type(TypeId::of::<M>(), std::any::type_name::<M>())
    }

    pub fn schema_for(&self, record: &RecordRef) -> Result<Arc<ModelSchema>> {
        self.schema_by_type(record.type_id(), record.type_name())
    }

    pub fn schema_named(&self, name: &str) -> Result<Arc<ModelSchema>> {
        self.by_name
            .get(name)
            .and_then(|type_id| self.by_type.get(type_id))
            .cloned()
            .ok_or_else(|| DbError::UnregisteredType(name.to_string()))
    }

    pub(crate) fn schema_by_type(
        &self,
        type_id: TypeId,
        type_name: &str,
    ) -> Result<Arc<ModelSchema>> {
        self.by_type
            .get(&type_id)
            .cloned()
            .ok_or_else(|| DbError::UnregisteredType(type_name.to_string()))
    }

    pub fn is_registered<M: Model>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<M>())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{Artist, Color, Person, registry};
    use crate::schema::{FieldKind, IndexKind, ModelSchema, SchemaBuilder, shared};

    #[derive(Debug, Clone, Default)]
    struct BadIndex {
        id: String,
        count: i64,
    }

    impl Model for BadIndex {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }

        fn schema() -> SchemaBuilder<Self> {
            ModelSchema::builder::<Self>("bad")
                .scalar("Count", |b| &b.count, |b| &mut b.count)
                .index(IndexKind::Lexical)
                .store_as("all")
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry();
        let person = registry.schema_of::<Person>().unwrap();
        assert_eq!(person.name(), "person");
        assert_eq!(registry.schema_named("person").unwrap().type_id(), person.type_id());
        assert_eq!(person.indexed().count(), 3);
        assert_eq!(person.collections().count(), 2);
        assert!(registry.names().contains(&"petOwner"));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = Registry::new();
        registry.register::<Color>().unwrap();
        assert!(matches!(
            registry.register::<Color>(),
            Err(DbError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_invalid_schema_reports_every_problem() {
        let err = Registry::new().with::<BadIndex>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cannot carry"));
        assert!(message.contains("reserved"));
    }

    #[test]
    fn test_unregistered_lookups() {
        let registry = Registry::new();
        assert!(matches!(
            registry.schema_named("ghost"),
            Err(DbError::UnregisteredType(name)) if name == "ghost"
        ));
        let color = shared(Color::default());
        assert!(registry.schema_for(&RecordRef::new(&color)).is_err());
        assert!(!registry.is_registered::<Color>());
    }

    #[test]
    fn test_field_accessors_round_trip() {
        let registry = registry();
        let schema = registry.schema_of::<Artist>().unwrap();
        let artist = shared(Artist::default());
        let record = RecordRef::new(&artist);

        let name = schema.field("Name").unwrap();
        record
            .write_field(name, crate::schema::FieldValue::Scalar("Alex".into()))
            .unwrap();
        assert_eq!(artist.read().unwrap().name, "Alex");

        let color = shared(Color::default());
        let relation = schema.field("FavoriteColor").unwrap();
        assert!(matches!(relation.kind(), FieldKind::Relation { .. }));
        record
            .write_field(
                relation,
                crate::schema::FieldValue::One(Some(RecordRef::new(&color))),
            )
            .unwrap();
        let stored = artist.read().unwrap().favorite_color.clone().unwrap();
        assert!(std::sync::Arc::ptr_eq(&stored, &color));
    }

    #[test]
    fn test_relationship_rejects_wrong_target_type() {
        let registry = registry();
        let schema = registry.schema_of::<Artist>().unwrap();
        let artist = shared(Artist::default());
        let stranger = shared(Artist::default());

        let err = RecordRef::new(&artist)
            .write_field(
                schema.field("FavoriteColor").unwrap(),
                crate::schema::FieldValue::One(Some(RecordRef::new(&stranger))),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::MalformedRelationship(_)));
    }
}
