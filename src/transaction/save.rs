use uuid::Uuid;
use crate::core::{Command, DbError, Result, Value, keys};
use crate::schema::{FieldDescriptor, FieldValue, IndexKind, Model, ModelSchema, RecordRef, Shared};
use super::{Transaction, handlers};

/// Relationship ids of a record being saved.
enum Link {
    One(Option<String>),
    Many(Vec<String>),
}

impl Transaction {
    /// Queues a write of `record`, assigning an id first if it has none.
    ///
    /// Related records are referenced by id only and must already have one.
    pub fn save<M: Model>(&mut self, record: &Shared<M>) -> Result<()> {
        self.save_record(RecordRef::new(record))
    }

    pub(crate) fn save_record(&mut self, record: RecordRef) -> Result<()> {
        let schema = self.registry.schema_for(&record)?;
        let values = schema
            .fields()
            .iter()
            .map(|field| Ok((field, record.read_field(field)?)))
            .collect::<Result<Vec<_>>>()?;

        // Resolve every referenced id before queueing anything
        let mut links = Vec::new();
        for (field, value) in &values {
            match value {
                FieldValue::One(target) => {
                    let id = target
                        .as_ref()
                        .map(|target| self.target_id(field, target))
                        .transpose()?;
                    links.push((*field, Link::One(id)));
                }
                FieldValue::Many(targets) => {
                    let ids = targets
                        .iter()
                        .map(|target| self.target_id(field, target))
                        .collect::<Result<Vec<_>>>()?;
                    links.push((*field, Link::Many(ids)));
                }
                _ => {}
            }
        }

        let mut id = record.id()?;
        let fresh = id.is_empty();
        if fresh {
            id = Uuid::new_v4().simple().to_string();
            record.set_id(id.clone())?;
        }
        let key = schema.record_key(&id);

        for (field, value) in &values {
            if let (Some(kind), FieldValue::Scalar(value)) = (field.index(), value) {
                self.save_index(&schema, field, kind, &id, value, fresh);
            }
        }

        let mut hmset = Command::new("HMSET").arg(&key);
        let mut nulls = Vec::new();
        for (field, value) in &values {
            if let FieldValue::Scalar(value) = value {
                match value.encode() {
                    Some(encoded) => hmset = hmset.arg(field.store_name()).arg(encoded),
                    None => nulls.push(field.store_name()),
                }
            }
        }
        if hmset.arguments().len() > 1 {
            self.enqueue(hmset, None);
        }
        if !nulls.is_empty() && !fresh {
            self.enqueue(Command::new("HDEL").arg(&key).args(nulls), None);
        }
        self.enqueue(
            Command::new("SADD").arg(schema.existence_key()).arg(&id),
            None,
        );

        for (field, value) in &values {
            let (command, items) = match value {
                FieldValue::List(items) => ("RPUSH", items),
                FieldValue::Set(items) => ("SADD", items),
                _ => continue,
            };
            let field_key = schema.field_key(&id, field);
            let encoded: Vec<String> = items.iter().filter_map(Value::encode).collect();
            self.enqueue(Command::new("DEL").arg(&field_key), None);
            if !encoded.is_empty() {
                self.enqueue(Command::new(command).arg(&field_key).args(encoded), None);
            }
        }

        for (field, link) in links {
            let field_key = schema.field_key(&id, field);
            match link {
                Link::One(Some(target)) => {
                    self.enqueue(Command::new("SET").arg(&field_key).arg(target), None)
                }
                Link::One(None) => self.enqueue(Command::new("DEL").arg(&field_key), None),
                Link::Many(targets) => {
                    self.enqueue(Command::new("DEL").arg(&field_key), None);
                    if !targets.is_empty() {
                        self.enqueue(Command::new("SADD").arg(&field_key).args(targets), None);
                    }
                }
            }
        }

        tracing::debug!(model = schema.name(), id = %id, "queued save");
        Ok(())
    }

    fn target_id(&self, field: &FieldDescriptor, target: &RecordRef) -> Result<String> {
        let target_schema = self.registry.schema_for(target)?;
        let id = target.id()?;
        if id.is_empty() {
            return Err(DbError::UnsavedReference {
                field: field.name().to_string(),
                type_name: target_schema.name().to_string(),
            });
        }
        Ok(id)
    }

    fn save_index(
        &mut self,
        schema: &ModelSchema,
        field: &FieldDescriptor,
        kind: IndexKind,
        id: &str,
        value: &Value,
        fresh: bool,
    ) {
        let index_key = schema.index_key(field);
        match kind {
            IndexKind::Numeric | IndexKind::Boolean => match value.score() {
                Some(score) => self.enqueue(
                    Command::new("ZADD").arg(&index_key).arg(score).arg(id),
                    None,
                ),
                None => self.enqueue(Command::new("ZREM").arg(&index_key).arg(id), None),
            },
            IndexKind::Lexical => {
                let new = value.encode();
                if !fresh {
                    // The old member has to go; it is named after the stored value
                    let data_key = schema.field_key(id, field);
                    self.enqueue(
                        Command::new("HGET")
                            .arg(schema.record_key(id))
                            .arg(field.store_name()),
                        Some(handlers::publish(data_key.clone())),
                    );
                    let index_key = index_key.clone();
                    let id = id.to_string();
                    let new = new.clone();
                    self.when_ready([data_key.clone()], move |tx| {
                        let old = tx.published(&data_key)?.into_string()?;
                        // An empty stored value is indexed too, so it is removed like any other
                        if let Some(old) = old.filter(|old| Some(old) != new.as_ref()) {
                            tx.enqueue(
                                Command::new("ZREM")
                                    .arg(&index_key)
                                    .arg(keys::lexical_member(&old, &id)),
                                None,
                            );
                        }
                        Ok(())
                    });
                }
                if let Some(new) = new {
                    self.enqueue(
                        Command::new("ZADD")
                            .arg(&index_key)
                            .arg(0)
                            .arg(keys::lexical_member(&new, id)),
                        None,
                    );
                }
            }
        }
    }
}
