use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::Geometry;
use crate::error::{ConfigError, IndexError};
use crate::planner::Planner;
use crate::storage::{Command, Connection, Reply, StoreError};

/// One query match: the id and the raw coordinates it was indexed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub pos: Vec<u64>,
}

/// A multi-dimensional range index over one backing-store connection.
///
/// Each method names the two store-level keys it touches: `zkey`, the
/// lex-ordered set of element strings, and `hkey`, the map from id to its
/// current element string. The pair is the whole persisted footprint of an
/// index, so many indexes can share one connection by using distinct keys.
///
/// Every operation is a single pipelined flush (plus one preliminary lookup
/// where the old element must be known). Partial progress of a failed batch
/// is not rolled back; `index` is idempotent, so callers re-issue it after a
/// batch of unknown intermediate state.
pub struct RangeIndex<C> {
    conn: C,
    geometry: Geometry,
    planner: Planner,
}

impl<C: Connection> RangeIndex<C> {
    pub fn new(conn: C, dims: usize, bits: u32) -> Result<Self, ConfigError> {
        let geometry = Geometry::new(dims, bits)?;
        Ok(Self { conn, geometry, planner: Planner::new(geometry) })
    }

    /// Cap the number of lex scans a query may issue. Must be greater than 1.
    pub fn with_max_cells(mut self, max_cells: usize) -> Result<Self, ConfigError> {
        self.planner = self.planner.with_max_cells(max_cells)?;
        Ok(self)
    }

    pub fn geometry(&self) -> &Geometry { &self.geometry }

    /// Consume the index, handing the connection back.
    pub fn into_connection(self) -> C { self.conn }

    /// Bind `id` to `pos`, replacing any previous binding. Removal of the
    /// old element, insertion of the new one, and the map update ride one
    /// pipelined flush.
    pub async fn index(&mut self, zkey: &str, hkey: &str, id: &str, pos: &[u64]) -> Result<(), IndexError> {
        let ele = self.geometry.element(pos, id)?;
        let old = self.run1(Command::HGet { key: hkey.into(), field: id.into() }).await?.into_value()?;

        let mut batch = Vec::with_capacity(3);
        if let Some(old) = old {
            batch.push(Command::ZRem { key: zkey.into(), members: vec![old] });
        }
        batch.push(Command::ZAdd { key: zkey.into(), member: ele.clone() });
        batch.push(Command::HSet { key: hkey.into(), field: id.into(), value: ele });
        self.run(batch).await?;
        Ok(())
    }

    /// Like [`index`](Self::index) for many bindings: one multi-get for the
    /// old elements, then one pipelined flush for every removal, insertion
    /// and map update.
    pub async fn batch_index(&mut self, zkey: &str, hkey: &str, ids: &[String], positions: &[Vec<u64>]) -> Result<(), IndexError> {
        if ids.len() != positions.len() {
            return Err(IndexError::BatchMismatch { ids: ids.len(), positions: positions.len() });
        }
        if ids.is_empty() {
            return Ok(());
        }
        let eles: Vec<String> =
            ids.iter().zip(positions).map(|(id, pos)| self.geometry.element(pos, id)).collect::<Result<_, _>>()?;
        let olds = self.run1(Command::HMGet { key: hkey.into(), fields: ids.to_vec() }).await?.into_values()?;

        let mut batch = Vec::with_capacity(ids.len() * 3);
        for ((id, ele), old) in ids.iter().zip(&eles).zip(olds) {
            if let Some(old) = old {
                batch.push(Command::ZRem { key: zkey.into(), members: vec![old] });
            }
            batch.push(Command::ZAdd { key: zkey.into(), member: ele.clone() });
            batch.push(Command::HSet { key: hkey.into(), field: id.clone(), value: ele.clone() });
        }
        self.run(batch).await?;
        Ok(())
    }

    /// Move an existing binding. Unlike [`index`](Self::index) the id must
    /// already be present.
    pub async fn update(&mut self, zkey: &str, hkey: &str, id: &str, pos: &[u64]) -> Result<(), IndexError> {
        let ele = self.geometry.element(pos, id)?;
        let old = self
            .run1(Command::HGet { key: hkey.into(), field: id.into() })
            .await?
            .into_value()?
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;

        self.run(vec![
            Command::ZRem { key: zkey.into(), members: vec![old] },
            Command::ZAdd { key: zkey.into(), member: ele.clone() },
            Command::HSet { key: hkey.into(), field: id.into(), value: ele },
        ])
        .await?;
        Ok(())
    }

    /// Remove a binding whose current coordinates the caller still knows.
    /// No lookup is needed: the element string is reconstructed.
    pub async fn unindex(&mut self, zkey: &str, hkey: &str, id: &str, pos: &[u64]) -> Result<(), IndexError> {
        let ele = self.geometry.element(pos, id)?;
        self.run(vec![
            Command::ZRem { key: zkey.into(), members: vec![ele] },
            Command::HDel { key: hkey.into(), fields: vec![id.to_string()] },
        ])
        .await?;
        Ok(())
    }

    /// Remove a binding by id alone, resolving the current element through
    /// the map.
    pub async fn unindex_by_id(&mut self, zkey: &str, hkey: &str, id: &str) -> Result<(), IndexError> {
        let ele = self
            .run1(Command::HGet { key: hkey.into(), field: id.into() })
            .await?
            .into_value()?
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;

        self.run(vec![
            Command::ZRem { key: zkey.into(), members: vec![ele] },
            Command::HDel { key: hkey.into(), fields: vec![id.to_string()] },
        ])
        .await?;
        Ok(())
    }

    /// Remove many bindings by id: one multi-get, then a single flush
    /// carrying one map deletion and one set removal for all of them.
    /// Fails without sending anything if any id is unknown.
    pub async fn batch_unindex_by_id(&mut self, zkey: &str, hkey: &str, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let eles = self.run1(Command::HMGet { key: hkey.into(), fields: ids.to_vec() }).await?.into_values()?;
        let mut members = Vec::with_capacity(ids.len());
        for (id, ele) in ids.iter().zip(eles) {
            members.push(ele.ok_or_else(|| IndexError::NotFound(id.clone()))?);
        }
        self.run(vec![
            Command::HDel { key: hkey.into(), fields: ids.to_vec() },
            Command::ZRem { key: zkey.into(), members },
        ])
        .await?;
        Ok(())
    }

    /// The current coordinates of `id`, parsed from its element string.
    pub async fn get_pos(&mut self, hkey: &str, id: &str) -> Result<Vec<u64>, IndexError> {
        let ele = self
            .run1(Command::HGet { key: hkey.into(), field: id.into() })
            .await?
            .into_value()?
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;
        Ok(self.geometry.decode(&ele)?.pos)
    }

    /// The current coordinates of many ids, in input order. Fails on the
    /// first unknown id.
    pub async fn batch_get_pos(&mut self, hkey: &str, ids: &[String]) -> Result<Vec<Vec<u64>>, IndexError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let eles = self.run1(Command::HMGet { key: hkey.into(), fields: ids.to_vec() }).await?.into_values()?;
        let mut positions = Vec::with_capacity(ids.len());
        for (id, ele) in ids.iter().zip(eles) {
            let ele = ele.ok_or_else(|| IndexError::NotFound(id.clone()))?;
            positions.push(self.geometry.decode(&ele)?.pos);
        }
        Ok(positions)
    }

    /// All ids whose coordinates fall inside the axis-aligned box, given as
    /// one `[lo, hi]` pair per dimension (endpoints may be swapped).
    ///
    /// The box is decomposed into aligned cells, every cell's lex range is
    /// scanned in one pipelined round trip, and entries outside the box are
    /// filtered out by their raw-coordinate suffix. Result order is
    /// unspecified; duplicates cannot occur since cells are disjoint and
    /// element strings unique.
    pub async fn query(&mut self, zkey: &str, query: &[(u64, u64)]) -> Result<Vec<Hit>, IndexError> {
        let plan = self.planner.plan(query)?;
        for range in &plan.ranges {
            self.conn.send(Command::ZRangeByLex { key: zkey.into(), start: range.start.clone(), stop: range.stop.clone() });
        }
        self.conn.flush().await?;

        let mut hits = Vec::new();
        for range in &plan.ranges {
            let entries = self
                .conn
                .receive()
                .await
                .and_then(Reply::into_entries)
                .map_err(|source| IndexError::ScanFailed { start: range.start.clone(), stop: range.stop.clone(), source })?;
            for raw in entries {
                let element = self.geometry.decode(&raw)?;
                if plan.contains(&element.pos) {
                    hits.push(Hit { id: element.id, pos: element.pos });
                }
            }
        }
        debug!(scans = plan.ranges.len(), hits = hits.len(), "box query complete");
        Ok(hits)
    }

    /// Send one command, flush, take its reply.
    async fn run1(&mut self, command: Command) -> Result<Reply, StoreError> {
        self.conn.send(command);
        self.conn.flush().await?;
        self.conn.receive().await
    }

    /// Send a batch, flush once, drain one reply per command so the
    /// connection stays usable for the next operation.
    async fn run(&mut self, batch: Vec<Command>) -> Result<Vec<Reply>, StoreError> {
        let count = batch.len();
        for command in batch {
            self.conn.send(command);
        }
        self.conn.flush().await?;
        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            replies.push(self.conn.receive().await?);
        }
        Ok(replies)
    }
}
