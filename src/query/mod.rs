// ============================================================================
// Query Module
// ============================================================================
//
// Scans over every record of one model, optionally ordered through one of
// its indexes. Ids are read in the first round trip; the records are loaded
// in the same transaction once the ids have been published.
//
// ============================================================================

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use crate::Client;
use crate::core::{Command, DbError, Reply, Result, keys};
use crate::schema::{FieldDescriptor, IndexKind, Model, ModelSchema, RecordRef, Shared, shared};
use crate::transaction::{Transaction, select_fields};

#[derive(Debug, Clone)]
struct Order {
    field: FieldDescriptor,
    descending: bool,
}

/// Builder for a scan over the records of `M`.
///
/// ```ignore
/// let oldest = client.query::<Person>().order_by("-Age").limit(3).run().await?;
/// ```
pub struct Query<'a, M: Model> {
    client: &'a Client,
    schema: Option<Arc<ModelSchema>>,
    include: Option<Vec<String>>,
    exclude: Vec<String>,
    order: Option<Order>,
    limit: Option<usize>,
    offset: usize,
    error: Option<DbError>,
    _model: PhantomData<fn() -> M>,
}

/// How to fetch the ids of a query and trim the reply.
struct IdPlan {
    command: Command,
    lexical: bool,
    /// Offset and limit still to apply to the reply
    window: Option<(usize, Option<usize>)>,
}

impl IdPlan {
    fn select(&self, reply: Reply) -> Result<Vec<String>> {
        let mut ids = reply.into_strings()?;
        if self.lexical {
            ids = ids
                .iter()
                .map(|member| keys::lexical_member_id(member).to_string())
                .collect();
        }
        if let Some((offset, limit)) = self.window {
            ids = ids
                .into_iter()
                .skip(offset)
                .take(limit.unwrap_or(usize::MAX))
                .collect();
        }
        Ok(ids)
    }
}

impl<'a, M: Model> Query<'a, M> {
    pub(crate) fn new(client: &'a Client) -> Self {
        let (schema, error) = match client.registry().schema_of::<M>() {
            Ok(schema) => (Some(schema), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            client,
            schema,
            include: None,
            exclude: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
            error,
            _model: PhantomData,
        }
    }

    fn fail(&mut self, err: DbError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Load only these fields.
    pub fn include(mut self, fields: &[&str]) -> Self {
        if !self.exclude.is_empty() {
            self.fail(DbError::ExecutionError(
                "a query cannot both include and exclude fields".into(),
            ));
        }
        self.include = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Load every field except these.
    pub fn exclude(mut self, fields: &[&str]) -> Self {
        if self.include.is_some() {
            self.fail(DbError::ExecutionError(
                "a query cannot both include and exclude fields".into(),
            ));
        }
        self.exclude.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Orders by an indexed field; a leading `-` sorts descending.
    pub fn order_by(mut self, field: &str) -> Self {
        let (name, descending) = match field.strip_prefix('-') {
            Some(name) => (name, true),
            None => (field, false),
        };
        let Some(schema) = self.schema.clone() else {
            return self;
        };
        match schema.field(name) {
            Some(descriptor) if descriptor.index().is_some() => {
                self.order = Some(Order {
                    field: descriptor.clone(),
                    descending,
                });
            }
            Some(_) => self.fail(DbError::ExecutionError(format!(
                "cannot order {} by '{}': the field is not indexed",
                schema.name(),
                name
            ))),
            None => self.fail(DbError::InvalidSchema(format!(
                "model '{}' has no field '{}'",
                schema.name(),
                name
            ))),
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn checked_schema(&mut self) -> Result<Arc<ModelSchema>> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.schema
            .clone()
            .ok_or_else(|| DbError::UnregisteredType(std::any::type_name::<M>().to_string()))
    }

    fn plan(&self, schema: &ModelSchema) -> IdPlan {
        match &self.order {
            Some(order) => {
                let start = i64::try_from(self.offset).unwrap_or(i64::MAX);
                // A window reaching past i64::MAX runs to the end of the index
                let stop = self
                    .limit
                    .and_then(|limit| i64::try_from(limit).ok())
                    .and_then(|limit| start.checked_add(limit - 1))
                    .unwrap_or(-1);
                let name = if order.descending { "ZREVRANGE" } else { "ZRANGE" };
                IdPlan {
                    command: Command::new(name)
                        .arg(schema.index_key(&order.field))
                        .arg(start)
                        .arg(stop),
                    lexical: order.field.index() == Some(IndexKind::Lexical),
                    window: None,
                }
            }
            None => IdPlan {
                command: Command::new("SMEMBERS").arg(schema.existence_key()),
                lexical: false,
                window: Some((self.offset, self.limit)),
            },
        }
    }

    fn fields(&self, schema: &ModelSchema) -> Result<Option<Vec<FieldDescriptor>>> {
        if let Some(include) = &self.include {
            let names: Vec<&str> = include.iter().map(String::as_str).collect();
            return select_fields(schema, &names).map(Some);
        }
        if self.exclude.is_empty() {
            return Ok(None);
        }
        let excluded: Vec<&str> = self.exclude.iter().map(String::as_str).collect();
        select_fields(schema, &excluded)?;
        Ok(Some(
            schema
                .fields()
                .iter()
                .filter(|field| !excluded.contains(&field.name()))
                .cloned()
                .collect(),
        ))
    }

    /// Ids of the matching records, in query order.
    pub async fn ids(mut self) -> Result<Vec<String>> {
        let schema = self.checked_schema()?;
        if self.limit == Some(0) {
            return Ok(Vec::new());
        }
        let plan = self.plan(&schema);
        let reply = self.client.execute(plan.command.clone()).await?;
        plan.select(reply)
    }

    /// Number of matching records.
    pub async fn count(mut self) -> Result<usize> {
        let schema = self.checked_schema()?;
        let total = self
            .client
            .execute(Command::new("SCARD").arg(schema.existence_key()))
            .await?
            .into_integer()?;
        let remaining = (total.max(0) as usize).saturating_sub(self.offset);
        Ok(match self.limit {
            Some(limit) => remaining.min(limit),
            None => remaining,
        })
    }

    /// Loads the matching records.
    pub async fn run(mut self) -> Result<Vec<Shared<M>>> {
        let schema = self.checked_schema()?;
        if self.limit == Some(0) {
            return Ok(Vec::new());
        }
        let include = self.fields(&schema)?;
        let plan = self.plan(&schema);
        let data_key = plan.command.key().unwrap_or_default().to_string();

        let found: Arc<Mutex<Vec<Shared<M>>>> = Arc::default();
        let mut tx = self.client.transaction().await?;

        let publish_key = data_key.clone();
        tx.enqueue(
            plan.command.clone(),
            Some(Box::new(move |tx: &mut Transaction, reply: Reply| -> Result<()> {
                tx.publish(publish_key, reply);
                Ok(())
            })),
        );

        let sink = Arc::clone(&found);
        tx.when_ready([data_key.clone()], move |tx| {
            let ids = plan.select(tx.published(&data_key)?)?;
            tracing::debug!(model = schema.name(), matches = ids.len(), "query ids resolved");
            for id in ids {
                let mut model = M::default();
                model.set_id(id);
                let record = shared(model);
                tx.find_record(RecordRef::new(&record), Arc::clone(&schema), include.clone())?;
                sink.lock()?.push(record);
            }
            Ok(())
        });
        tx.exec().await?;

        let records = std::mem::take(&mut *found.lock()?);
        Ok(records)
    }
}
