pub mod command;
pub mod error;
pub mod keys;
pub mod value;

pub use command::{Command, Reply};
pub use error::{DbError, Result};
pub use value::{DataType, Value};
