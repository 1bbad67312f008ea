//! Reply reconciliation.
//!
//! Each constructor returns the [`Handler`] for one read command. Replies
//! that carry no data count as a miss against the record's possible hits.

use std::sync::Arc;
use crate::core::{DataType, DbError, Reply, Result};
use crate::schema::{FieldDescriptor, FieldKind, FieldValue, ModelSchema, RecordRef};
use super::{Handler, Transaction};

fn scalar_type(field: &FieldDescriptor) -> Result<DataType> {
    match field.kind() {
        FieldKind::Scalar(data_type) => Ok(data_type),
        other => Err(DbError::TypeMismatch(format!(
            "field '{}' is {:?}, not a scalar",
            field.name(),
            other
        ))),
    }
}

fn decode_into(record: &RecordRef, field: &FieldDescriptor, raw: &str) -> Result<()> {
    let value = scalar_type(field)?.decode(raw)?;
    record.write_field(field, FieldValue::Scalar(value))
}

/// HGET of one field.
pub(crate) fn scalar_into_field(
    record: RecordRef,
    record_key: String,
    field: FieldDescriptor,
) -> Handler {
    Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
        match reply.into_string()? {
            Some(raw) => decode_into(&record, &field, &raw),
            None => tx.register_miss(&record_key),
        }
    })
}

/// HMGET of `fields`, matched by position. Nil entries leave the field as is.
pub(crate) fn fields_into_struct(
    record: RecordRef,
    record_key: String,
    fields: Vec<FieldDescriptor>,
) -> Handler {
    Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
        let values = reply.into_optional_strings()?;
        if values.len() != fields.len() && !values.is_empty() {
            return Err(DbError::Protocol(format!(
                "asked {} for {} fields, got {} values",
                record_key,
                fields.len(),
                values.len()
            )));
        }
        if values.iter().all(Option::is_none) {
            return tx.register_miss(&record_key);
        }
        for (field, value) in fields.iter().zip(values) {
            if let Some(raw) = value {
                decode_into(&record, field, &raw)?;
            }
        }
        Ok(())
    })
}

/// HGETALL. Names that are not scalar fields of the schema are skipped.
pub(crate) fn struct_scan(
    record: RecordRef,
    record_key: String,
    schema: Arc<ModelSchema>,
) -> Handler {
    Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
        let flat = reply.into_strings()?;
        if flat.is_empty() {
            return tx.register_miss(&record_key);
        }
        if flat.len() % 2 != 0 {
            return Err(DbError::Protocol(format!(
                "odd number of elements in HGETALL reply for {}",
                record_key
            )));
        }
        for pair in flat.chunks(2) {
            let field = schema
                .scalars()
                .find(|field| field.store_name() == pair[0]);
            match field {
                Some(field) => decode_into(&record, field, &pair[1])?,
                None => tracing::trace!(key = %record_key, field = %pair[0], "ignoring unknown field"),
            }
        }
        Ok(())
    })
}

/// LRANGE or SMEMBERS of a collection field.
pub(crate) fn aggregate_into_field(
    record: RecordRef,
    record_key: String,
    field: FieldDescriptor,
) -> Handler {
    Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
        let raw = reply.into_strings()?;
        let empty = raw.is_empty();
        let (data_type, is_list) = match field.kind() {
            FieldKind::List(data_type) => (data_type, true),
            FieldKind::Set(data_type) => (data_type, false),
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "field '{}' is {:?}, not a collection",
                    field.name(),
                    other
                )));
            }
        };
        let values = raw
            .iter()
            .map(|item| data_type.decode(item))
            .collect::<Result<Vec<_>>>()?;
        let value = if is_list {
            FieldValue::List(values)
        } else {
            FieldValue::Set(values)
        };
        record.write_field(&field, value)?;

        if empty {
            tx.register_miss(&record_key)?;
        }
        Ok(())
    })
}

/// Forwards the reply into the deferred registry under `key`.
pub(crate) fn publish(key: String) -> Handler {
    Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
        tx.publish(key, reply);
        Ok(())
    })
}
