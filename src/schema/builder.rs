use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use crate::core::{DbError, Result, keys};
use super::field::{
    Cardinality, Factory, FieldDescriptor, FieldKind, FieldType, FieldValue, Getter, IndexKind,
    Setter,
};
use super::model::{Model, RecordRef, Shared, shared};

fn model_ref<M: Model>(any: &dyn Any) -> Result<&M> {
    any.downcast_ref::<M>().ok_or_else(|| {
        DbError::TypeMismatch(format!(
            "field accessor for {} applied to another type",
            std::any::type_name::<M>()
        ))
    })
}

fn model_mut<M: Model>(any: &mut dyn Any) -> Result<&mut M> {
    any.downcast_mut::<M>().ok_or_else(|| {
        DbError::TypeMismatch(format!(
            "field mutator for {} applied to another type",
            std::any::type_name::<M>()
        ))
    })
}

fn wrong_shape(field: &str, expected: &str, got: &FieldValue) -> DbError {
    DbError::TypeMismatch(format!(
        "field '{}' expects a {} value, got a {}",
        field,
        expected,
        got.kind_name()
    ))
}

fn factory_for<T: Model>() -> Factory {
    Arc::new(|id: &str| {
        let mut target = T::default();
        target.set_id(id.to_string());
        RecordRef::new(&shared(target))
    })
}

fn downcast_target<T: Model>(field: &str, target: &RecordRef) -> Result<Shared<T>> {
    target.downcast::<T>().ok_or_else(|| {
        DbError::MalformedRelationship(format!(
            "field '{}' holds {} records, cannot assign a {}",
            field,
            std::any::type_name::<T>(),
            target.type_name()
        ))
    })
}

/// Builds the field table for a [`Model`].
///
/// ```ignore
/// ModelSchema::builder::<Artist>("artist")
///     .scalar("Name", |a| &a.name, |a| &mut a.name)
///     .index(IndexKind::Lexical)
///     .one("FavoriteColor", |a| &a.favorite_color, |a| &mut a.favorite_color)
/// ```
pub struct SchemaBuilder<M: Model> {
    name: String,
    fields: Vec<FieldDescriptor>,
    errors: Vec<String>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> SchemaBuilder<M> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            errors: Vec::new(),
            _model: PhantomData,
        }
    }

    fn push(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn scalar<T, G, S>(self, name: &str, get: G, get_mut: S) -> Self
    where
        T: FieldType,
        G: Fn(&M) -> &T + Send + Sync + 'static,
        S: Fn(&mut M) -> &mut T + Send + Sync + 'static,
    {
        let field_name = name.to_string();
        let getter: Getter = Arc::new(move |any: &dyn Any| -> Result<FieldValue> {
            let model = model_ref::<M>(any)?;
            Ok(FieldValue::Scalar(get(model).to_value()))
        });
        let setter: Setter = Arc::new(move |any: &mut dyn Any, value: FieldValue| -> Result<()> {
            let model = model_mut::<M>(any)?;
            match value {
                FieldValue::Scalar(v) => {
                    *get_mut(model) = T::from_value(v)?;
                    Ok(())
                }
                other => Err(wrong_shape(&field_name, "scalar", &other)),
            }
        });
        self.push(FieldDescriptor {
            name: name.to_string(),
            store_name: name.to_string(),
            kind: FieldKind::Scalar(T::data_type()),
            index: None,
            getter,
            setter,
            target_factory: None,
        })
    }

    /// Ordered collection stored as a list.
    pub fn list<T, G, S>(self, name: &str, get: G, get_mut: S) -> Self
    where
        T: FieldType,
        G: Fn(&M) -> &Vec<T> + Send + Sync + 'static,
        S: Fn(&mut M) -> &mut Vec<T> + Send + Sync + 'static,
    {
        let (getter, setter) = collection_accessors(name, false, get, get_mut);
        self.push(FieldDescriptor {
            name: name.to_string(),
            store_name: name.to_string(),
            kind: FieldKind::List(T::data_type()),
            index: None,
            getter,
            setter,
            target_factory: None,
        })
    }

    /// Unordered collection stored as a set. Duplicates collapse on save.
    pub fn set<T, G, S>(self, name: &str, get: G, get_mut: S) -> Self
    where
        T: FieldType,
        G: Fn(&M) -> &Vec<T> + Send + Sync + 'static,
        S: Fn(&mut M) -> &mut Vec<T> + Send + Sync + 'static,
    {
        let (getter, setter) = collection_accessors(name, true, get, get_mut);
        self.push(FieldDescriptor {
            name: name.to_string(),
            store_name: name.to_string(),
            kind: FieldKind::Set(T::data_type()),
            index: None,
            getter,
            setter,
            target_factory: None,
        })
    }

    /// To-one relationship.
    pub fn one<T, G, S>(self, name: &str, get: G, get_mut: S) -> Self
    where
        T: Model,
        G: Fn(&M) -> &Option<Shared<T>> + Send + Sync + 'static,
        S: Fn(&mut M) -> &mut Option<Shared<T>> + Send + Sync + 'static,
    {
        let field_name = name.to_string();
        let getter: Getter = Arc::new(move |any: &dyn Any| -> Result<FieldValue> {
            let model = model_ref::<M>(any)?;
            Ok(FieldValue::One(get(model).as_ref().map(RecordRef::new)))
        });
        let setter: Setter = Arc::new(move |any: &mut dyn Any, value: FieldValue| -> Result<()> {
            let model = model_mut::<M>(any)?;
            match value {
                FieldValue::One(Some(target)) => {
                    *get_mut(model) = Some(downcast_target::<T>(&field_name, &target)?);
                    Ok(())
                }
                FieldValue::One(None) => {
                    *get_mut(model) = None;
                    Ok(())
                }
                other => Err(DbError::MalformedRelationship(format!(
                    "field '{}' expects a to-one relationship, got a {}",
                    field_name,
                    other.kind_name()
                ))),
            }
        });
        self.push(FieldDescriptor {
            name: name.to_string(),
            store_name: name.to_string(),
            kind: FieldKind::Relation {
                cardinality: Cardinality::One,
                target: TypeId::of::<T>(),
                target_type: std::any::type_name::<T>(),
            },
            index: None,
            getter,
            setter,
            target_factory: Some(factory_for::<T>()),
        })
    }

    /// To-many relationship.
    pub fn many<T, G, S>(self, name: &str, get: G, get_mut: S) -> Self
    where
        T: Model,
        G: Fn(&M) -> &Vec<Shared<T>> + Send + Sync + 'static,
        S: Fn(&mut M) -> &mut Vec<Shared<T>> + Send + Sync + 'static,
    {
        let field_name = name.to_string();
        let getter: Getter = Arc::new(move |any: &dyn Any| -> Result<FieldValue> {
            let model = model_ref::<M>(any)?;
            Ok(FieldValue::Many(get(model).iter().map(RecordRef::new).collect()))
        });
        let setter: Setter = Arc::new(move |any: &mut dyn Any, value: FieldValue| -> Result<()> {
            let model = model_mut::<M>(any)?;
            match value {
                FieldValue::Many(targets) => {
                    let typed = targets
                        .iter()
                        .map(|target| downcast_target::<T>(&field_name, target))
                        .collect::<Result<Vec<_>>>()?;
                    *get_mut(model) = typed;
                    Ok(())
                }
                other => Err(DbError::MalformedRelationship(format!(
                    "field '{}' expects a to-many relationship, got a {}",
                    field_name,
                    other.kind_name()
                ))),
            }
        });
        self.push(FieldDescriptor {
            name: name.to_string(),
            store_name: name.to_string(),
            kind: FieldKind::Relation {
                cardinality: Cardinality::Many,
                target: TypeId::of::<T>(),
                target_type: std::any::type_name::<T>(),
            },
            index: None,
            getter,
            setter,
            target_factory: Some(factory_for::<T>()),
        })
    }

    /// Indexes the most recently added field.
    pub fn index(mut self, kind: IndexKind) -> Self {
        match self.fields.last_mut() {
            Some(field) => match field.kind {
                FieldKind::Scalar(dt) if kind.supports(dt) => field.index = Some(kind),
                _ => self.errors.push(format!(
                    "field '{}' of kind {:?} cannot carry a {:?} index",
                    field.name, field.kind, kind
                )),
            },
            None => self.errors.push("index() called before any field".to_string()),
        }
        self
    }

    /// Overrides the store-facing name of the most recently added field.
    pub fn store_as(mut self, store_name: &str) -> Self {
        match self.fields.last_mut() {
            Some(field) => field.store_name = store_name.to_string(),
            None => self.errors.push("store_as() called before any field".to_string()),
        }
        self
    }

    pub fn build(self) -> Result<ModelSchema> {
        let mut errors = self.errors;

        if self.name.is_empty() || self.name.contains(':') || self.name.contains(' ') {
            errors.push(format!("invalid model name '{}'", self.name));
        }

        let mut names = HashSet::new();
        let mut store_names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                errors.push(format!("duplicate field '{}'", field.name));
            }
            if !store_names.insert(field.store_name.as_str()) {
                errors.push(format!("duplicate store name '{}'", field.store_name));
            }
            if field.store_name.is_empty() || field.store_name.contains(':') {
                errors.push(format!("invalid store name '{}'", field.store_name));
            }
            if field.store_name == keys::EXISTENCE_SUFFIX {
                errors.push(format!(
                    "store name '{}' is reserved for the existence index",
                    field.store_name
                ));
            }
        }

        if !errors.is_empty() {
            return Err(DbError::InvalidSchema(format!(
                "{}: {}",
                self.name,
                errors.join("; ")
            )));
        }

        Ok(ModelSchema {
            name: self.name,
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            fields: self.fields,
            factory: factory_for::<M>(),
        })
    }
}

fn collection_accessors<M, T, G, S>(
    name: &str,
    dedup: bool,
    get: G,
    get_mut: S,
) -> (Getter, Setter)
where
    M: Model,
    T: FieldType,
    G: Fn(&M) -> &Vec<T> + Send + Sync + 'static,
    S: Fn(&mut M) -> &mut Vec<T> + Send + Sync + 'static,
{
    let field_name = name.to_string();
    let getter: Getter = Arc::new(move |any: &dyn Any| -> Result<FieldValue> {
        let model = model_ref::<M>(any)?;
        let values = get(model).iter().map(FieldType::to_value).collect();
        Ok(if dedup {
            FieldValue::Set(values)
        } else {
            FieldValue::List(values)
        })
    });
    let setter: Setter = Arc::new(move |any: &mut dyn Any, value: FieldValue| -> Result<()> {
        let model = model_mut::<M>(any)?;
        match value {
            FieldValue::List(values) | FieldValue::Set(values) => {
                *get_mut(model) = values
                    .into_iter()
                    .map(T::from_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(())
            }
            other => Err(wrong_shape(&field_name, "collection", &other)),
        }
    });
    (getter, setter)
}

/// Field table and key layout of one registered model type.
pub struct ModelSchema {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
    factory: Factory,
}

impl ModelSchema {
    pub fn builder<M: Model>(name: impl Into<String>) -> SchemaBuilder<M> {
        SchemaBuilder::new(name)
    }

    /// Canonical name used as the key prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn scalars(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_scalar())
    }

    pub fn collections(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::List(_) | FieldKind::Set(_)))
    }

    pub fn relations(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    pub fn indexed(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.index.is_some())
    }

    pub fn has_indexes(&self) -> bool {
        self.fields.iter().any(|f| f.index.is_some())
    }

    /// Fresh default record of this type carrying `id`.
    pub fn instantiate(&self, id: &str) -> RecordRef {
        (self.factory)(id)
    }

    pub fn record_key(&self, id: &str) -> String {
        keys::record_key(&self.name, id)
    }

    pub fn field_key(&self, id: &str, field: &FieldDescriptor) -> String {
        keys::field_key(&self.name, id, &field.store_name)
    }

    pub fn index_key(&self, field: &FieldDescriptor) -> String {
        keys::index_key(&self.name, &field.store_name)
    }

    pub fn existence_key(&self) -> String {
        keys::existence_key(&self.name)
    }
}

impl std::fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}
