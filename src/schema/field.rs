use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use crate::core::{DataType, DbError, Result, Value};
use super::model::RecordRef;

/// Conversion between a Rust field type and a [`Value`].
///
/// The data type is fixed per field when the schema is built, so decoding a
/// reply never has to guess.
pub trait FieldType: Clone + Send + Sync + 'static {
    fn data_type() -> DataType;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: DataType, got: &Value) -> Result<T> {
    Err(DbError::TypeMismatch(format!(
        "expected {}, got {}",
        expected,
        got.type_name()
    )))
}

impl FieldType for String {
    fn data_type() -> DataType {
        DataType::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch(DataType::Text, &other),
        }
    }
}

macro_rules! integer_field_type {
    ($($t:ty),*) => {
        $(
            impl FieldType for $t {
                fn data_type() -> DataType {
                    DataType::Integer
                }

                fn to_value(&self) -> Value {
                    Value::Integer(*self as i64)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Integer(i) => <$t>::try_from(i).map_err(|_| {
                            DbError::TypeMismatch(format!(
                                "{} is out of range for {}",
                                i,
                                stringify!($t)
                            ))
                        }),
                        other => mismatch(DataType::Integer, &other),
                    }
                }
            }
        )*
    };
}

integer_field_type!(i64, i32, i16, u32, u16, u8);

impl FieldType for f64 {
    fn data_type() -> DataType {
        DataType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.as_f64() {
            Some(f) => Ok(f),
            None => mismatch(DataType::Float, &value),
        }
    }
}

impl FieldType for f32 {
    fn data_type() -> DataType {
        DataType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value.as_f64() {
            Some(f) => Ok(f as f32),
            None => mismatch(DataType::Float, &value),
        }
    }
}

impl FieldType for bool {
    fn data_type() -> DataType {
        DataType::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => mismatch(DataType::Boolean, &other),
        }
    }
}

impl FieldType for serde_json::Value {
    fn data_type() -> DataType {
        DataType::Json
    }

    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(serde_json::from_str(&s)?),
            other => mismatch(DataType::Json, &other),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn data_type() -> DataType {
        T::data_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Index maintained for a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Sorted by numeric value.
    Numeric,
    /// Sorted by string value through a `"{value} {id}"` member with score 0.
    Lexical,
    /// Numeric 0/1.
    Boolean,
}

impl IndexKind {
    pub fn supports(&self, data_type: DataType) -> bool {
        match self {
            Self::Numeric => data_type.is_numeric(),
            Self::Lexical => data_type == DataType::Text,
            Self::Boolean => data_type == DataType::Boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(DataType),
    List(DataType),
    Set(DataType),
    Relation {
        cardinality: Cardinality,
        target: TypeId,
        target_type: &'static str,
    },
}

/// A field's value lifted out of a record.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Scalar(Value),
    List(Vec<Value>),
    Set(Vec<Value>),
    One(Option<RecordRef>),
    Many(Vec<RecordRef>),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::One(_) => "to-one relationship",
            Self::Many(_) => "to-many relationship",
        }
    }
}

pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Result<FieldValue> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, FieldValue) -> Result<()> + Send + Sync>;
pub(crate) type Factory = Arc<dyn Fn(&str) -> RecordRef + Send + Sync>;

/// One entry of a model's field table: naming, kind, optional index, and the
/// typed accessor/mutator pair captured when the schema was built.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) store_name: String,
    pub(crate) kind: FieldKind,
    pub(crate) index: Option<IndexKind>,
    pub(crate) getter: Getter,
    pub(crate) setter: Setter,
    pub(crate) target_factory: Option<Factory>,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn index(&self) -> Option<IndexKind> {
        self.index
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self.kind {
            FieldKind::Scalar(dt) | FieldKind::List(dt) | FieldKind::Set(dt) => Some(dt),
            FieldKind::Relation { .. } => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation { .. })
    }

    pub(crate) fn read(&self, model: &dyn Any) -> Result<FieldValue> {
        (self.getter)(model)
    }

    pub(crate) fn write(&self, model: &mut dyn Any, value: FieldValue) -> Result<()> {
        (self.setter)(model, value)
    }

    /// Fresh instance of the relationship's target type carrying `id`.
    pub(crate) fn instantiate_target(&self, id: &str) -> Result<RecordRef> {
        match &self.target_factory {
            Some(factory) => Ok(factory(id)),
            None => Err(DbError::MalformedRelationship(format!(
                "field '{}' is not a relationship",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("store_name", &self.store_name)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .finish()
    }
}
