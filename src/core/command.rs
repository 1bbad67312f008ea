use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::{DbError, Result};

/// A single store command: name plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// First argument, which is the key for every command this crate issues.
    pub fn key(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A reply from the store, one per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(String),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Self::Status("OK".to_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Turns an error reply into a protocol error; everything else passes through.
    pub fn check(self) -> Result<Self> {
        match self {
            Self::Error(msg) => Err(DbError::Protocol(msg)),
            other => Ok(other),
        }
    }

    pub fn into_string(self) -> Result<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Bulk(s) | Self::Status(s) => Ok(Some(s)),
            Self::Integer(i) => Ok(Some(i.to_string())),
            Self::Error(msg) => Err(DbError::Protocol(msg)),
            Self::Array(_) => Err(DbError::TypeMismatch(
                "expected a single value, got an array reply".into(),
            )),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self {
            Self::Integer(i) => Ok(i),
            Self::Bulk(s) | Self::Status(s) => s.parse().map_err(|_| {
                DbError::TypeMismatch(format!("expected an integer reply, got '{}'", s))
            }),
            Self::Error(msg) => Err(DbError::Protocol(msg)),
            other => Err(DbError::TypeMismatch(format!(
                "expected an integer reply, got {:?}",
                other
            ))),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        Ok(self.into_integer()? != 0)
    }

    /// Array elements. A nil reply counts as an empty array.
    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Self::Array(items) => Ok(items),
            Self::Nil => Ok(Vec::new()),
            Self::Error(msg) => Err(DbError::Protocol(msg)),
            other => Err(DbError::TypeMismatch(format!(
                "expected an array reply, got {:?}",
                other
            ))),
        }
    }

    /// Array of optional strings, as returned by HMGET.
    pub fn into_optional_strings(self) -> Result<Vec<Option<String>>> {
        self.into_array()?
            .into_iter()
            .map(Reply::into_string)
            .collect()
    }

    /// Array of strings, as returned by SMEMBERS or LRANGE. Nil elements are an error.
    pub fn into_strings(self) -> Result<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|item| {
                item.into_string()?.ok_or_else(|| {
                    DbError::TypeMismatch("unexpected nil element in array reply".into())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("ZADD").arg("person:Age").arg(30.5).arg("abc");
        assert_eq!(cmd.name(), "ZADD");
        assert_eq!(cmd.arguments(), &["person:Age", "30.5", "abc"]);
        assert_eq!(cmd.key(), Some("person:Age"));
        assert_eq!(cmd.to_string(), "ZADD person:Age 30.5 abc");
    }

    #[test]
    fn test_reply_conversions() {
        assert_eq!(Reply::Nil.into_string().unwrap(), None);
        assert_eq!(Reply::Integer(1).into_bool().unwrap(), true);
        assert!(Reply::Nil.into_array().unwrap().is_empty());

        let strings = Reply::Array(vec![Reply::Bulk("a".into()), Reply::Bulk("b".into())])
            .into_strings()
            .unwrap();
        assert_eq!(strings, vec!["a", "b"]);
    }

    #[test]
    fn test_reply_errors() {
        assert!(matches!(
            Reply::Error("WRONGTYPE".into()).check(),
            Err(DbError::Protocol(_))
        ));
        assert!(Reply::Bulk("x".into()).into_array().is_err());
        assert!(
            Reply::Array(vec![Reply::Nil])
                .into_strings()
                .is_err()
        );
    }
}
