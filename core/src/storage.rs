use async_trait::async_trait;
use thiserror::Error;

/// One pipelined command against the backing store.
///
/// The ordered set is manipulated purely by lex key: `ZAdd` carries no score
/// because every entry is stored with the constant score 0, leaving the
/// store's ordering entirely to the bytes of the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ZAdd { key: String, member: String },
    ZRem { key: String, members: Vec<String> },
    /// Inclusive at both ends.
    ZRangeByLex { key: String, start: String, stop: String },
    HGet { key: String, field: String },
    HMGet { key: String, fields: Vec<String> },
    HSet { key: String, field: String, value: String },
    HDel { key: String, fields: Vec<String> },
}

impl Command {
    /// Command name plus arguments, for wrapping backend failures.
    pub fn describe(&self) -> String {
        match self {
            Command::ZAdd { key, member } => format!("ZADD {key} {member}"),
            Command::ZRem { key, members } => format!("ZREM {key} {}", members.join(" ")),
            Command::ZRangeByLex { key, start, stop } => format!("ZRANGEBYLEX {key} [{start} [{stop}"),
            Command::HGet { key, field } => format!("HGET {key} {field}"),
            Command::HMGet { key, fields } => format!("HMGET {key} {}", fields.join(" ")),
            Command::HSet { key, field, value } => format!("HSET {key} {field} {value}"),
            Command::HDel { key, fields } => format!("HDEL {key} {}", fields.join(" ")),
        }
    }
}

/// Reply to one command, in the same order the commands were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledgement of a write.
    Unit,
    /// `HGet`: the field's value, if present.
    Value(Option<String>),
    /// `HMGet`: one slot per requested field.
    Values(Vec<Option<String>>),
    /// `ZRangeByLex`: matching entries in lex order.
    Entries(Vec<String>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Unit => "unit",
            Reply::Value(_) => "value",
            Reply::Values(_) => "values",
            Reply::Entries(_) => "entries",
        }
    }

    pub fn into_value(self) -> Result<Option<String>, StoreError> {
        match self {
            Reply::Value(value) => Ok(value),
            other => Err(StoreError::UnexpectedReply { expected: "value", got: other.kind() }),
        }
    }

    pub fn into_values(self) -> Result<Vec<Option<String>>, StoreError> {
        match self {
            Reply::Values(values) => Ok(values),
            other => Err(StoreError::UnexpectedReply { expected: "values", got: other.kind() }),
        }
    }

    pub fn into_entries(self) -> Result<Vec<String>, StoreError> {
        match self {
            Reply::Entries(entries) => Ok(entries),
            other => Err(StoreError::UnexpectedReply { expected: "entries", got: other.kind() }),
        }
    }
}

/// A backend call failed, or replied with something a command cannot mean.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{command} failed: {source}")]
    Backend { command: String, source: Box<dyn std::error::Error + Send + Sync + 'static> },
    #[error("expected a {expected} reply, got {got}")]
    UnexpectedReply { expected: &'static str, got: &'static str },
    #[error("receive called with no pending reply")]
    NoPendingReply,
}

impl StoreError {
    pub fn backend(command: &Command, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend { command: command.describe(), source: Box::new(source) }
    }
}

/// A pipelined connection to the backing store.
///
/// `send` only queues; nothing reaches the store before `flush`, which
/// submits the whole pipeline in one round trip. `receive` yields exactly
/// one reply per sent command, in submission order. These two calls are the
/// only suspension points in the crate.
///
/// The connection is exclusive to the operation in progress (`&mut self`);
/// callers wanting concurrent operations on one index use one connection
/// each. An operation cancelled before its flush has sent nothing; one
/// cancelled at a suspension point may leave queued commands or undrained
/// replies behind, and the connection should then be discarded rather than
/// reused.
#[async_trait]
pub trait Connection: Send {
    fn send(&mut self, command: Command);
    async fn flush(&mut self) -> Result<(), StoreError>;
    async fn receive(&mut self) -> Result<Reply, StoreError>;
}
