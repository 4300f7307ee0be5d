use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Bound;

use async_trait::async_trait;
use tracing::trace;

use redimension_core::storage::{Command, Connection, Reply, StoreError};

/// In-process backing store: one lex-ordered set per zset key, one string
/// map per hash key.
///
/// Commands queue on `send` and apply on `flush`, staging replies in
/// submission order the way a pipelined connection would, so the core's
/// send/flush/receive discipline is exercised for real even without a
/// network in the way.
#[derive(Debug, Default)]
pub struct MemoryStore {
    zsets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    queued: Vec<Command>,
    staged: VecDeque<Reply>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Entries of one zset in lex order. Test helper.
    pub fn zset_entries(&self, key: &str) -> Vec<String> {
        self.zsets.get(key).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Field/value pairs of one hash, sorted by field. Test helper.
    pub fn hash_entries(&self, key: &str) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .hashes
            .get(key)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        entries.sort();
        entries
    }

    fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::ZAdd { key, member } => {
                self.zsets.entry(key).or_default().insert(member);
                Reply::Unit
            }
            Command::ZRem { key, members } => {
                if let Some(set) = self.zsets.get_mut(&key) {
                    for member in &members {
                        set.remove(member);
                    }
                }
                Reply::Unit
            }
            Command::ZRangeByLex { key, start, stop } => {
                let entries = match self.zsets.get(&key) {
                    Some(set) if start <= stop => {
                        set.range::<str, _>((Bound::Included(start.as_str()), Bound::Included(stop.as_str()))).cloned().collect()
                    }
                    _ => Vec::new(),
                };
                Reply::Entries(entries)
            }
            Command::HGet { key, field } => Reply::Value(self.hashes.get(&key).and_then(|map| map.get(&field)).cloned()),
            Command::HMGet { key, fields } => {
                let map = self.hashes.get(&key);
                Reply::Values(fields.iter().map(|field| map.and_then(|map| map.get(field)).cloned()).collect())
            }
            Command::HSet { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
                Reply::Unit
            }
            Command::HDel { key, fields } => {
                if let Some(map) = self.hashes.get_mut(&key) {
                    for field in &fields {
                        map.remove(field);
                    }
                }
                Reply::Unit
            }
        }
    }
}

#[async_trait]
impl Connection for MemoryStore {
    fn send(&mut self, command: Command) { self.queued.push(command); }

    async fn flush(&mut self) -> Result<(), StoreError> {
        trace!(commands = self.queued.len(), "applying pipeline");
        for command in std::mem::take(&mut self.queued) {
            let reply = self.apply(command);
            self.staged.push_back(reply);
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Reply, StoreError> { self.staged.pop_front().ok_or(StoreError::NoPendingReply) }
}
