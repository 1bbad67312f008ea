use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::connection::{Connection, Connector};
use crate::core::{Command, DbError, Reply, Result};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A value held under one key.
#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

/// Keyspace plus the bookkeeping tests look at.
#[derive(Debug, Default)]
struct StoreState {
    keys: HashMap<String, Entry>,
    /// Every command received, including MULTI/EXEC/DISCARD framing
    log: Vec<Command>,
    /// Fail the next `exec` with this message instead of applying it
    fault: Option<String>,
}

/// In-process store with a Redis-style command surface.
///
/// Every connection shares one keyspace; an `exec` batch is applied under a
/// single write lock, which gives it MULTI/EXEC atomicity.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in arrival order.
    pub async fn commands(&self) -> Vec<Command> {
        self.state.read().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.write().await.log.clear();
    }

    /// Makes the next `exec` on any connection fail without touching the keyspace.
    pub async fn fail_next_exec(&self, message: &str) {
        self.state.write().await.fault = Some(message.to_string());
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.state.read().await.keys.contains_key(key)
    }

    pub async fn key_count(&self) -> usize {
        self.state.read().await.keys.len()
    }

    /// Applies one command directly, bypassing connections and the log.
    pub async fn apply(&self, command: &Command) -> Reply {
        let mut state = self.state.write().await;
        apply_command(&mut state.keys, command)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, id: u64) -> Result<Box<dyn Connection>> {
        tracing::trace!(connection = id, "opened in-memory connection");
        Ok(Box::new(MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            active: true,
        }))
    }
}

/// One connection to a [`MemoryStore`].
pub struct MemoryConnection {
    id: u64,
    state: Arc<RwLock<StoreState>>,
    active: bool,
}

impl MemoryConnection {
    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(DbError::ExecutionError(format!(
                "connection {} is closed",
                self.id
            )))
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn exec(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.ensure_active()?;
        let mut state = self.state.write().await;

        state.log.push(Command::new("MULTI"));
        state.log.extend(commands.iter().cloned());

        if let Some(message) = state.fault.take() {
            return Err(DbError::Protocol(message));
        }

        let replies = commands
            .iter()
            .map(|command| apply_command(&mut state.keys, command))
            .collect();
        state.log.push(Command::new("EXEC"));
        Ok(replies)
    }

    async fn query(&mut self, command: &Command) -> Result<Reply> {
        self.ensure_active()?;
        let mut state = self.state.write().await;
        state.log.push(command.clone());
        Ok(apply_command(&mut state.keys, command))
    }

    async fn discard(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state.write().await.log.push(Command::new("DISCARD"));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }
}

// ============================================================================
// Command evaluation
// ============================================================================

fn arity_error(name: &str) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}

fn bulk_array<I: IntoIterator<Item = String>>(items: I) -> Reply {
    Reply::Array(items.into_iter().map(Reply::Bulk).collect())
}

/// Redis-style inclusive range with negative indexes counted from the end.
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn parse_range(args: &[String]) -> std::result::Result<(i64, i64), Reply> {
    let parse = |raw: &String| {
        raw.parse::<i64>().map_err(|_| {
            Reply::Error("ERR value is not an integer or out of range".to_string())
        })
    };
    Ok((parse(&args[1])?, parse(&args[2])?))
}

fn sorted_members(set: &HashMap<String, f64>) -> Vec<String> {
    let mut members: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    members.into_iter().map(|(m, _)| m.clone()).collect()
}

/// Drops keys whose collection became empty.
fn prune(keys: &mut HashMap<String, Entry>, key: &str) {
    let empty = match keys.get(key) {
        Some(Entry::Hash(h)) => h.is_empty(),
        Some(Entry::List(l)) => l.is_empty(),
        Some(Entry::Set(s)) => s.is_empty(),
        Some(Entry::SortedSet(z)) => z.is_empty(),
        _ => false,
    };
    if empty {
        keys.remove(key);
    }
}

macro_rules! typed_entry {
    ($keys:expr, $key:expr, $variant:ident, $default:expr) => {
        match $keys
            .entry($key.to_string())
            .or_insert_with(|| Entry::$variant($default))
        {
            Entry::$variant(inner) => inner,
            _ => return Reply::Error(WRONGTYPE.to_string()),
        }
    };
}

fn apply_command(keys: &mut HashMap<String, Entry>, command: &Command) -> Reply {
    let name = command.name().to_uppercase();
    let args = command.arguments();

    match name.as_str() {
        "HMSET" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return arity_error(&name);
            }
            let hash = typed_entry!(keys, &args[0], Hash, BTreeMap::new());
            for pair in args[1..].chunks(2) {
                hash.insert(pair[0].clone(), pair[1].clone());
            }
            Reply::ok()
        }
        "HDEL" => {
            if args.len() < 2 {
                return arity_error(&name);
            }
            let removed = match keys.get_mut(&args[0]) {
                None => 0,
                Some(Entry::Hash(hash)) => args[1..]
                    .iter()
                    .filter(|f| hash.remove(*f).is_some())
                    .count(),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            prune(keys, &args[0]);
            Reply::Integer(removed as i64)
        }
        "HGETALL" => {
            if args.len() != 1 {
                return arity_error(&name);
            }
            match keys.get(&args[0]) {
                None => Reply::Array(Vec::new()),
                Some(Entry::Hash(hash)) => bulk_array(
                    hash.iter()
                        .flat_map(|(f, v)| [f.clone(), v.clone()]),
                ),
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }
        "HMGET" | "HGET" => {
            if args.len() < 2 || (name == "HGET" && args.len() != 2) {
                return arity_error(&name);
            }
            let hash = match keys.get(&args[0]) {
                None => None,
                Some(Entry::Hash(hash)) => Some(hash),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            let lookup = |field: &String| match hash.and_then(|h| h.get(field)) {
                Some(v) => Reply::Bulk(v.clone()),
                None => Reply::Nil,
            };
            if name == "HGET" {
                lookup(&args[1])
            } else {
                Reply::Array(args[1..].iter().map(lookup).collect())
            }
        }
        "SADD" => {
            if args.len() < 2 {
                return arity_error(&name);
            }
            let set = typed_entry!(keys, &args[0], Set, BTreeSet::new());
            let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
            Reply::Integer(added as i64)
        }
        "SREM" => {
            if args.len() < 2 {
                return arity_error(&name);
            }
            let removed = match keys.get_mut(&args[0]) {
                None => 0,
                Some(Entry::Set(set)) => args[1..].iter().filter(|m| set.remove(*m)).count(),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            prune(keys, &args[0]);
            Reply::Integer(removed as i64)
        }
        "SMEMBERS" | "SCARD" => {
            if args.len() != 1 {
                return arity_error(&name);
            }
            let members = match keys.get(&args[0]) {
                None => Vec::new(),
                Some(Entry::Set(set)) => set.iter().cloned().collect(),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            if name == "SCARD" {
                Reply::Integer(members.len() as i64)
            } else {
                bulk_array(members)
            }
        }
        "SISMEMBER" => {
            if args.len() != 2 {
                return arity_error(&name);
            }
            match keys.get(&args[0]) {
                None => Reply::Integer(0),
                Some(Entry::Set(set)) => Reply::Integer(set.contains(&args[1]) as i64),
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }
        "RPUSH" => {
            if args.len() < 2 {
                return arity_error(&name);
            }
            let list = typed_entry!(keys, &args[0], List, Vec::new());
            list.extend(args[1..].iter().cloned());
            Reply::Integer(list.len() as i64)
        }
        "LRANGE" => {
            if args.len() != 3 {
                return arity_error(&name);
            }
            let (start, stop) = match parse_range(args) {
                Ok(range) => range,
                Err(reply) => return reply,
            };
            match keys.get(&args[0]) {
                None => Reply::Array(Vec::new()),
                Some(Entry::List(list)) => match normalize_range(start, stop, list.len()) {
                    Some((from, to)) => bulk_array(list[from..=to].iter().cloned()),
                    None => Reply::Array(Vec::new()),
                },
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }
        "ZADD" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return arity_error(&name);
            }
            let mut pairs = Vec::with_capacity(args.len() / 2);
            for pair in args[1..].chunks(2) {
                match pair[0].parse::<f64>() {
                    Ok(score) if !score.is_nan() => pairs.push((score, pair[1].clone())),
                    _ => return Reply::Error("ERR value is not a valid float".to_string()),
                }
            }
            let zset = typed_entry!(keys, &args[0], SortedSet, HashMap::new());
            let added = pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count();
            Reply::Integer(added as i64)
        }
        "ZREM" => {
            if args.len() < 2 {
                return arity_error(&name);
            }
            let removed = match keys.get_mut(&args[0]) {
                None => 0,
                Some(Entry::SortedSet(zset)) => args[1..]
                    .iter()
                    .filter(|m| zset.remove(*m).is_some())
                    .count(),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            prune(keys, &args[0]);
            Reply::Integer(removed as i64)
        }
        "ZRANGE" | "ZREVRANGE" => {
            if args.len() != 3 {
                return arity_error(&name);
            }
            let (start, stop) = match parse_range(args) {
                Ok(range) => range,
                Err(reply) => return reply,
            };
            let mut members = match keys.get(&args[0]) {
                None => Vec::new(),
                Some(Entry::SortedSet(zset)) => sorted_members(zset),
                Some(_) => return Reply::Error(WRONGTYPE.to_string()),
            };
            if name == "ZREVRANGE" {
                members.reverse();
            }
            match normalize_range(start, stop, members.len()) {
                Some((from, to)) => bulk_array(members.drain(from..=to)),
                None => Reply::Array(Vec::new()),
            }
        }
        "SET" => {
            if args.len() != 2 {
                return arity_error(&name);
            }
            keys.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Reply::ok()
        }
        "GET" => {
            if args.len() != 1 {
                return arity_error(&name);
            }
            match keys.get(&args[0]) {
                None => Reply::Nil,
                Some(Entry::Str(value)) => Reply::Bulk(value.clone()),
                Some(_) => Reply::Error(WRONGTYPE.to_string()),
            }
        }
        "DEL" => {
            if args.is_empty() {
                return arity_error(&name);
            }
            let removed = args.iter().filter(|k| keys.remove(*k).is_some()).count();
            Reply::Integer(removed as i64)
        }
        _ => Reply::Error(format!("ERR unknown command '{}'", command.name())),
    }
}
