use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

use redimension_core::storage::{Command, Connection, Reply, StoreError};

#[derive(Error, Debug)]
pub enum SledStoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("non-utf8 entry: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Durable backing store over sled.
///
/// Each store-level name gets its own tree: zset names hold element strings
/// as keys with empty values (sled's byte order is exactly the lex order the
/// index relies on), hash names hold id -> element string. Commands queue on
/// `send`, apply on `flush`, and replies drain in submission order.
pub struct SledStore {
    db: sled::Db,
    trees: HashMap<String, sled::Tree>,
    queued: Vec<Command>,
    staged: VecDeque<Reply>,
}

impl SledStore {
    pub fn open(db: sled::Db) -> Self { Self { db, trees: HashMap::new(), queued: Vec::new(), staged: VecDeque::new() } }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let dbpath = path.join("sled");
        debug!(path = %dbpath.display(), "opening sled store");
        let db = sled::open(&dbpath)?;
        Ok(Self::open(db))
    }

    pub fn new_test() -> anyhow::Result<Self> {
        let db = sled::Config::new().temporary(true).flush_every_ms(None).open()?;
        Ok(Self::open(db))
    }

    fn tree(&mut self, prefix: &str, name: &str) -> Result<sled::Tree, sled::Error> {
        let full = format!("{prefix}_{name}");
        if let Some(tree) = self.trees.get(&full) {
            return Ok(tree.clone());
        }
        let tree = self.db.open_tree(&full)?;
        self.trees.insert(full, tree.clone());
        Ok(tree)
    }

    fn zset(&mut self, name: &str) -> Result<sled::Tree, sled::Error> { self.tree("zset", name) }
    fn hash(&mut self, name: &str) -> Result<sled::Tree, sled::Error> { self.tree("hash", name) }

    fn apply(&mut self, command: &Command) -> Result<Reply, SledStoreError> {
        match command {
            Command::ZAdd { key, member } => {
                self.zset(key)?.insert(member.as_bytes(), &[])?;
                Ok(Reply::Unit)
            }
            Command::ZRem { key, members } => {
                let tree = self.zset(key)?;
                for member in members {
                    tree.remove(member.as_bytes())?;
                }
                Ok(Reply::Unit)
            }
            Command::ZRangeByLex { key, start, stop } => {
                let tree = self.zset(key)?;
                let mut entries = Vec::new();
                if start <= stop {
                    for item in tree.range(start.as_bytes()..=stop.as_bytes()) {
                        let (entry, _) = item?;
                        entries.push(String::from_utf8(entry.to_vec())?);
                    }
                }
                Ok(Reply::Entries(entries))
            }
            Command::HGet { key, field } => {
                let value = self.hash(key)?.get(field.as_bytes())?;
                Ok(Reply::Value(value.map(|v| String::from_utf8(v.to_vec())).transpose()?))
            }
            Command::HMGet { key, fields } => {
                let tree = self.hash(key)?;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(tree.get(field.as_bytes())?.map(|v| String::from_utf8(v.to_vec())).transpose()?);
                }
                Ok(Reply::Values(values))
            }
            Command::HSet { key, field, value } => {
                self.hash(key)?.insert(field.as_bytes(), value.as_bytes())?;
                Ok(Reply::Unit)
            }
            Command::HDel { key, fields } => {
                let tree = self.hash(key)?;
                for field in fields {
                    tree.remove(field.as_bytes())?;
                }
                Ok(Reply::Unit)
            }
        }
    }
}

#[async_trait]
impl Connection for SledStore {
    fn send(&mut self, command: Command) { self.queued.push(command); }

    async fn flush(&mut self) -> Result<(), StoreError> {
        trace!(commands = self.queued.len(), "applying pipeline");
        for command in std::mem::take(&mut self.queued) {
            let reply = self.apply(&command).map_err(|e| StoreError::backend(&command, e))?;
            self.staged.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Reply, StoreError> { self.staged.pop_front().ok_or(StoreError::NoPendingReply) }
}
