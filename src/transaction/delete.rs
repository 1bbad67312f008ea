use crate::core::{Command, DbError, Result, keys};
use crate::schema::{FieldDescriptor, FieldValue, IndexKind, Model, ModelSchema, RecordRef, Shared};
use super::{Transaction, handlers};

impl Transaction {
    /// Queues removal of `record`, its collections, relationships and index
    /// entries. Index entries are located with the values `record` holds.
    pub fn delete<M: Model>(&mut self, record: &Shared<M>) -> Result<()> {
        self.delete_record(RecordRef::new(record))
    }

    pub(crate) fn delete_record(&mut self, record: RecordRef) -> Result<()> {
        let schema = self.registry.schema_for(&record)?;
        let id = record.id()?;
        if id.is_empty() {
            tracing::debug!(model = schema.name(), "record has no id, nothing to delete");
            return Ok(());
        }

        let indexed = schema
            .indexed()
            .map(|field| match record.read_field(field)? {
                FieldValue::Scalar(value) => Ok((field.clone(), value.encode())),
                other => Err(DbError::TypeMismatch(format!(
                    "indexed field '{}' holds a {}",
                    field.name(),
                    other.kind_name()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        self.queue_delete(&schema, &id, &indexed);
        Ok(())
    }

    /// Queues removal of the record `id` of model `name`.
    ///
    /// For models with indexes the stored index values are read first, and a
    /// record that does not exist is left alone.
    pub fn delete_by_id(&mut self, name: &str, id: &str) -> Result<()> {
        let schema = self.registry.schema_named(name)?;
        if !schema.has_indexes() {
            self.queue_delete(&schema, id, &[]);
            return Ok(());
        }

        let record_key = schema.record_key(id);
        let exists_key = keys::field_key(schema.name(), id, keys::EXISTENCE_SUFFIX);
        let fields: Vec<FieldDescriptor> = schema.indexed().cloned().collect();

        self.enqueue(
            Command::new("SISMEMBER")
                .arg(schema.existence_key())
                .arg(id),
            Some(handlers::publish(exists_key.clone())),
        );
        self.enqueue(
            Command::new("HMGET")
                .arg(&record_key)
                .args(fields.iter().map(|f| f.store_name())),
            Some(handlers::publish(record_key.clone())),
        );

        let id = id.to_string();
        self.when_ready([exists_key.clone(), record_key.clone()], move |tx| {
            if !tx.published(&exists_key)?.into_bool()? {
                tracing::debug!(key = %record_key, "record does not exist, nothing to delete");
                return Ok(());
            }
            let stored = tx.published(&record_key)?.into_optional_strings()?;
            let indexed: Vec<(FieldDescriptor, Option<String>)> =
                fields.into_iter().zip(stored).collect();
            tx.queue_delete(&schema, &id, &indexed);
            Ok(())
        });
        Ok(())
    }

    fn queue_delete(
        &mut self,
        schema: &ModelSchema,
        id: &str,
        indexed: &[(FieldDescriptor, Option<String>)],
    ) {
        let record_key = schema.record_key(id);
        let owned_keys = schema
            .collections()
            .chain(schema.relations())
            .map(|field| schema.field_key(id, field));
        self.enqueue(
            Command::new("DEL").arg(&record_key).args(owned_keys),
            None,
        );
        self.enqueue(
            Command::new("SREM").arg(schema.existence_key()).arg(id),
            None,
        );

        for (field, value) in indexed {
            let index_key = schema.index_key(field);
            match (field.index(), value) {
                (Some(IndexKind::Lexical), Some(value)) => self.enqueue(
                    Command::new("ZREM")
                        .arg(&index_key)
                        .arg(keys::lexical_member(value, id)),
                    None,
                ),
                (Some(IndexKind::Lexical), None) | (None, _) => {}
                (Some(_), _) => self.enqueue(Command::new("ZREM").arg(&index_key).arg(id), None),
            }
        }

        tracing::debug!(model = schema.name(), id = %id, "queued delete");
    }
}
