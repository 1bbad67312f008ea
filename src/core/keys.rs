//! Store key layout.
//!
//! `{type}:{id}` holds a record's scalar fields, `{type}:{id}:{field}` a
//! collection or relationship, `{type}:{field}` an index and `{type}:all`
//! the existence index.

pub const EXISTENCE_SUFFIX: &str = "all";

pub fn record_key(type_name: &str, id: &str) -> String {
    format!("{}:{}", type_name, id)
}

pub fn field_key(type_name: &str, id: &str, field: &str) -> String {
    format!("{}:{}:{}", type_name, id, field)
}

pub fn index_key(type_name: &str, field: &str) -> String {
    format!("{}:{}", type_name, field)
}

pub fn existence_key(type_name: &str) -> String {
    format!("{}:{}", type_name, EXISTENCE_SUFFIX)
}

/// Member of a lexical index: the value, a space, then the id.
pub fn lexical_member(value: &str, id: &str) -> String {
    format!("{} {}", value, id)
}

/// Id part of a lexical index member. Ids never contain spaces, values may.
pub fn lexical_member_id(member: &str) -> &str {
    member.rsplit_once(' ').map(|(_, id)| id).unwrap_or(member)
}
