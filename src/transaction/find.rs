use std::sync::Arc;
use crate::core::{Command, DbError, Reply, Result};
use crate::schema::{
    Cardinality, FieldDescriptor, FieldKind, FieldValue, Model, ModelSchema, RecordRef, Shared,
};
use super::{Transaction, handlers};

/// Structures of one record load that have not reported back yet.
///
/// When every one of them came back empty the record may not exist, and an
/// existence check decides between "not found" and "empty record".
pub(crate) struct HitCounter {
    remaining: usize,
    type_name: String,
    existence_key: String,
    id: String,
}

impl Transaction {
    /// Queues a load of every field of `record`, which must carry an id.
    pub fn find<M: Model>(&mut self, record: &Shared<M>) -> Result<()> {
        let schema = self.registry.schema_of::<M>()?;
        self.find_record(RecordRef::new(record), schema, None)
    }

    /// Queues a load of the named fields only.
    pub fn find_fields<M: Model>(&mut self, record: &Shared<M>, fields: &[&str]) -> Result<()> {
        let schema = self.registry.schema_of::<M>()?;
        let include = select_fields(&schema, fields)?;
        self.find_record(RecordRef::new(record), schema, Some(include))
    }

    /// Queues a load of a record known only by its model name.
    pub fn find_by_name(&mut self, name: &str, id: &str) -> Result<RecordRef> {
        let schema = self.registry.schema_named(name)?;
        let record = schema.instantiate(id);
        self.find_record(record.clone(), schema, None)?;
        Ok(record)
    }

    pub(crate) fn find_record(
        &mut self,
        record: RecordRef,
        schema: Arc<ModelSchema>,
        include: Option<Vec<FieldDescriptor>>,
    ) -> Result<()> {
        let id = record.id()?;
        let key = schema.record_key(&id);

        if let Some(cached) = self.cache.get(&key) {
            tracing::trace!(key = %key, "record already loading in this transaction");
            if !cached.ptr_eq(&record) {
                let cached = cached.clone();
                self.aliases.push((record, cached));
            }
            return Ok(());
        }

        let filtered = include.is_some();
        let wanted = include.unwrap_or_else(|| schema.fields().to_vec());

        // Relationship targets must be loadable before anything is queued
        let relations = wanted
            .iter()
            .filter(|field| field.is_relation())
            .map(|field| Ok((field.clone(), self.target_schema(field)?)))
            .collect::<Result<Vec<_>>>()?;

        self.cache.insert(key.clone(), record.clone());
        let mut hits = 0;

        let scalars: Vec<FieldDescriptor> =
            wanted.iter().filter(|f| f.is_scalar()).cloned().collect();
        if !filtered && !scalars.is_empty() {
            self.enqueue(
                Command::new("HGETALL").arg(&key),
                Some(handlers::struct_scan(record.clone(), key.clone(), schema.clone())),
            );
            hits += 1;
        } else if scalars.len() == 1 {
            let field = scalars[0].clone();
            self.enqueue(
                Command::new("HGET").arg(&key).arg(field.store_name()),
                Some(handlers::scalar_into_field(record.clone(), key.clone(), field)),
            );
            hits += 1;
        } else if scalars.len() > 1 {
            let command = Command::new("HMGET")
                .arg(&key)
                .args(scalars.iter().map(|f| f.store_name()));
            self.enqueue(
                command,
                Some(handlers::fields_into_struct(record.clone(), key.clone(), scalars)),
            );
            hits += 1;
        }

        for field in wanted.iter() {
            let command = match field.kind() {
                FieldKind::List(_) => Command::new("LRANGE")
                    .arg(schema.field_key(&id, field))
                    .arg(0)
                    .arg(-1),
                FieldKind::Set(_) => Command::new("SMEMBERS").arg(schema.field_key(&id, field)),
                _ => continue,
            };
            self.enqueue(
                command,
                Some(handlers::aggregate_into_field(
                    record.clone(),
                    key.clone(),
                    field.clone(),
                )),
            );
            hits += 1;
        }

        for (relation, target_schema) in relations {
            let data_key = schema.field_key(&id, &relation);
            let command = match relation.kind() {
                FieldKind::Relation {
                    cardinality: Cardinality::One,
                    ..
                } => Command::new("GET").arg(&data_key),
                _ => Command::new("SMEMBERS").arg(&data_key),
            };
            self.enqueue(command, Some(handlers::publish(data_key.clone())));

            let record = record.clone();
            let record_key = key.clone();
            self.when_ready([data_key.clone()], move |tx| {
                tx.resolve_relation(record, record_key, relation, target_schema, data_key)
            });
            hits += 1;
        }

        tracing::debug!(model = schema.name(), id = %id, structures = hits, "queued find");
        self.expect_hits(&key, hits, &schema, &id);
        Ok(())
    }

    fn target_schema(&self, field: &FieldDescriptor) -> Result<Arc<ModelSchema>> {
        match field.kind() {
            FieldKind::Relation {
                target,
                target_type,
                ..
            } => self.registry.schema_by_type(target, target_type),
            other => Err(DbError::MalformedRelationship(format!(
                "field '{}' is {:?}, not a relationship",
                field.name(),
                other
            ))),
        }
    }

    /// Fills a relationship field from the ids published under `data_key`.
    fn resolve_relation(
        &mut self,
        record: RecordRef,
        record_key: String,
        relation: FieldDescriptor,
        target_schema: Arc<ModelSchema>,
        data_key: String,
    ) -> Result<()> {
        let reply = self.published(&data_key)?;
        match relation.kind() {
            FieldKind::Relation {
                cardinality: Cardinality::One,
                ..
            } => match reply.into_string()?.filter(|id| !id.is_empty()) {
                Some(id) => {
                    let target = self.related(&target_schema, &id)?;
                    record.write_field(&relation, FieldValue::One(Some(target)))
                }
                None => {
                    record.write_field(&relation, FieldValue::One(None))?;
                    self.register_miss(&record_key)
                }
            },
            FieldKind::Relation {
                cardinality: Cardinality::Many,
                ..
            } => {
                let ids = reply.into_strings()?;
                let targets = ids
                    .iter()
                    .map(|id| self.related(&target_schema, id))
                    .collect::<Result<Vec<_>>>()?;
                record.write_field(&relation, FieldValue::Many(targets))?;
                if ids.is_empty() {
                    self.register_miss(&record_key)?;
                }
                Ok(())
            }
            other => Err(DbError::MalformedRelationship(format!(
                "field '{}' is {:?}, not a relationship",
                relation.name(),
                other
            ))),
        }
    }

    /// The record for `id` in this execution, loading it on first sight.
    fn related(&mut self, schema: &Arc<ModelSchema>, id: &str) -> Result<RecordRef> {
        if let Some(cached) = self.cache.get(&schema.record_key(id)) {
            return Ok(cached.clone());
        }
        let target = schema.instantiate(id);
        self.find_record(target.clone(), Arc::clone(schema), None)?;
        Ok(target)
    }

    pub(crate) fn expect_hits(&mut self, record_key: &str, hits: usize, schema: &ModelSchema, id: &str) {
        let counter = HitCounter {
            remaining: hits,
            type_name: schema.name().to_string(),
            existence_key: schema.existence_key(),
            id: id.to_string(),
        };
        if hits == 0 {
            self.check_existence(record_key.to_string(), counter);
        } else {
            self.possible_hits.insert(record_key.to_string(), counter);
        }
    }

    /// Counts an empty reply against the record's possible hits.
    pub(crate) fn register_miss(&mut self, record_key: &str) -> Result<()> {
        let exhausted = match self.possible_hits.get_mut(record_key) {
            Some(counter) => {
                counter.remaining = counter.remaining.saturating_sub(1);
                counter.remaining == 0
            }
            None => false,
        };
        if exhausted {
            if let Some(counter) = self.possible_hits.remove(record_key) {
                self.check_existence(record_key.to_string(), counter);
            }
        }
        Ok(())
    }

    fn check_existence(&mut self, record_key: String, counter: HitCounter) {
        tracing::trace!(key = %record_key, "no data found, checking existence index");
        let command = Command::new("SISMEMBER")
            .arg(&counter.existence_key)
            .arg(&counter.id);
        let type_name = counter.type_name;
        self.enqueue(
            command,
            Some(Box::new(move |_: &mut Transaction, reply: Reply| -> Result<()> {
                if reply.into_bool()? {
                    Ok(())
                } else {
                    Err(DbError::not_found(record_key, type_name))
                }
            })),
        );
    }
}

/// Descriptors for `names`, in the given order.
pub(crate) fn select_fields(schema: &ModelSchema, names: &[&str]) -> Result<Vec<FieldDescriptor>> {
    names
        .iter()
        .map(|name| {
            schema.field(name).cloned().ok_or_else(|| {
                DbError::InvalidSchema(format!(
                    "model '{}' has no field '{}'",
                    schema.name(),
                    name
                ))
            })
        })
        .collect()
}
