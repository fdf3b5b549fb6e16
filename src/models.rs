use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::Upstream;
use crate::auth::AuthState;
use crate::cache::StatsCache;
use crate::config::Config;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    /// Static baseline statistics loaded at startup; merged into every
    /// stats response
    pub baseline: Map<String, Value>,
    pub miners: MinerStore,
    pub cache: StatsCache,
    pub upstream: Arc<dyn Upstream>,
    pub auth: AuthState,
}

/// A single mining rig as exposed over the API. `hash_rate` stays a
/// string on the wire; it is parsed as a decimal only when averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Miner {
    pub id: u64,
    pub name: String,
    pub location: String,
    pub hash_rate: String,
}

struct MinerTable {
    miners: Vec<Miner>,
    last_id: u64,
}

/// In-memory miner list with paginated reads
pub struct MinerStore {
    inner: RwLock<MinerTable>,
    page_size: usize,
}

impl MinerStore {
    /// Ids are allocated above both the historical floor (100) and the
    /// largest seeded id.
    pub fn new(seed: Vec<Miner>, page_size: usize) -> Self {
        let last_id = seed.iter().map(|m| m.id).max().unwrap_or(0).max(100);
        Self {
            inner: RwLock::new(MinerTable {
                miners: seed,
                last_id,
            }),
            page_size: page_size.max(1),
        }
    }

    /// Point-in-time copy of the whole list
    pub async fn snapshot(&self) -> Vec<Miner> {
        self.inner.read().await.miners.clone()
    }

    /// One page of miners plus the total page count. An out-of-range
    /// page yields an empty item list.
    pub async fn page(&self, page_start: usize) -> (Vec<Miner>, usize) {
        let table = self.inner.read().await;
        let total_pages = total_pages(table.miners.len(), self.page_size);
        let items = table
            .miners
            .chunks(self.page_size)
            .nth(page_start)
            .map(|chunk| chunk.to_vec())
            .unwrap_or_default();
        (items, total_pages)
    }

    /// Append a new miner and return it along with the refreshed first
    /// page.
    pub async fn insert(&self, name: String, location: String, hash_rate: String) -> Miner {
        let mut table = self.inner.write().await;
        table.last_id += 1;
        let miner = Miner {
            id: table.last_id,
            name,
            location,
            hash_rate,
        };
        table.miners.push(miner.clone());
        miner
    }

    /// Update a miner in place; `None` when the id is unknown.
    pub async fn update(
        &self,
        id: u64,
        name: String,
        location: String,
        hash_rate: String,
    ) -> Option<Miner> {
        let mut table = self.inner.write().await;
        let miner = table.miners.iter_mut().find(|m| m.id == id)?;
        miner.name = name;
        miner.location = location;
        miner.hash_rate = hash_rate;
        Some(miner.clone())
    }

    /// Remove a miner by id; false when the id is unknown.
    pub async fn remove(&self, id: u64) -> bool {
        let mut table = self.inner.write().await;
        let before = table.miners.len();
        table.miners.retain(|m| m.id != id);
        table.miners.len() < before
    }
}

fn total_pages(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size)
}

/// Load the miner seed list from a JSON array file
pub fn load_miners(path: &Path) -> anyhow::Result<Vec<Miner>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading miner seed file {}", path.display()))?;
    let miners: Vec<Miner> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing miner seed file {}", path.display()))?;
    Ok(miners)
}

/// Load the static baseline statistics document
pub fn load_baseline(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading baseline statistics file {}", path.display()))?;
    let baseline: Map<String, Value> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing baseline statistics file {}", path.display()))?;
    Ok(baseline)
}
