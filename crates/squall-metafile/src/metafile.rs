//! The top-level torrent object.

use crate::announce::{AnnounceUrl, AnnounceUrlList};
use crate::error::MetafileError;
use crate::storage::{FileStorage, Protocol};
use log::debug;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const TARGET: &str = "squall_metafile::metafile";

/// A DHT bootstrap node: host and port ([BEP-0005](https://www.bittorrent.org/beps/bep_0005.html)).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DhtNode {
    pub host: String,
    pub port: u16,
}

impl DhtNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// An infohash of a related torrent, 20 bytes for v1 or 32 for v2
/// ([BEP-0038](https://www.bittorrent.org/beps/bep_0038.html)).
pub type SimilarTorrent = Vec<u8>;

/// Everything a `.torrent` file carries: trackers, seeds, metadata, and the
/// file storage with its piece data.
///
/// Scalar fields are only mutated from the thread that owns the metafile;
/// the storage has its own interior locking for the hashing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metafile {
    trackers: AnnounceUrlList,
    http_seeds: Vec<String>,
    web_seeds: Vec<String>,
    dht_nodes: Vec<DhtNode>,
    name: String,
    comment: String,
    created_by: String,
    creation_date: i64,
    private: bool,
    source: String,
    similar_torrents: BTreeSet<SimilarTorrent>,
    collections: BTreeSet<String>,
    storage: FileStorage,
}

impl Metafile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a metafile from disk.
    pub fn load(path: &Path) -> Result<Self, MetafileError> {
        debug!(target: TARGET, "loading metafile from {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Encode and write the metafile to disk.
    pub fn save(&self, path: &Path) -> Result<(), MetafileError> {
        debug!(target: TARGET, "saving metafile to {}", path.display());
        Ok(std::fs::write(path, self.encode()?)?)
    }

    //  Trackers

    pub fn trackers(&self) -> &AnnounceUrlList {
        &self.trackers
    }

    pub fn trackers_mut(&mut self) -> &mut AnnounceUrlList {
        &mut self.trackers
    }

    /// Add a tracker. Without an explicit tier every tracker lands in a
    /// fresh tier of its own. Re-adding a known URL with a different tier
    /// moves it.
    pub fn add_tracker(
        &mut self,
        url: impl Into<String>,
        tier: Option<usize>,
    ) -> Result<(), MetafileError> {
        let url = url.into();
        let tier = tier.unwrap_or_else(|| self.trackers.tier_count());

        if self.trackers.contains(&url) {
            self.trackers.erase(&url);
            let tier = tier.min(self.trackers.tier_count());
            return self.trackers.insert(AnnounceUrl::new(url, tier));
        }
        self.trackers.insert(AnnounceUrl::new(url, tier))
    }

    pub fn remove_tracker(&mut self, url: &str) -> bool {
        self.trackers.erase(url)
    }

    pub fn clear_trackers(&mut self) {
        self.trackers.clear();
    }

    //  Seeds and nodes

    /// Hoffman-style HTTP seeds (`httpseeds`, BEP-0017).
    pub fn http_seeds(&self) -> &[String] {
        &self.http_seeds
    }

    pub fn add_http_seed(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.http_seeds.contains(&url) {
            self.http_seeds.push(url);
        }
    }

    pub fn remove_http_seed(&mut self, url: &str) {
        self.http_seeds.retain(|u| u != url);
    }

    /// GetRight-style web seeds (`url-list`, BEP-0019).
    pub fn web_seeds(&self) -> &[String] {
        &self.web_seeds
    }

    pub fn add_web_seed(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.web_seeds.contains(&url) {
            self.web_seeds.push(url);
        }
    }

    pub fn remove_web_seed(&mut self, url: &str) {
        self.web_seeds.retain(|u| u != url);
    }

    pub fn dht_nodes(&self) -> &[DhtNode] {
        &self.dht_nodes
    }

    pub fn add_dht_node(&mut self, host: impl Into<String>, port: u16) {
        let node = DhtNode::new(host, port);
        if !self.dht_nodes.contains(&node) {
            self.dht_nodes.push(node);
        }
    }

    pub fn remove_dht_node(&mut self, host: &str, port: u16) {
        self.dht_nodes.retain(|n| n.host != host || n.port != port);
    }

    //  Scalar metadata

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn set_created_by(&mut self, created_by: impl Into<String>) {
        self.created_by = created_by.into();
    }

    /// Creation time as a Unix timestamp; 0 means unset.
    pub fn creation_date(&self) -> i64 {
        self.creation_date
    }

    pub fn set_creation_date(&mut self, timestamp: i64) {
        self.creation_date = timestamp;
    }

    pub fn set_creation_date_from(&mut self, time: SystemTime) {
        self.creation_date = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn set_private(&mut self, private: bool) {
        self.private = private;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    //  Similar torrents and collections (BEP-0038)

    pub fn similar_torrents(&self) -> impl Iterator<Item = &[u8]> {
        self.similar_torrents.iter().map(Vec::as_slice)
    }

    /// Record a related torrent's infohash. Must be 20 (v1) or 32 (v2)
    /// bytes.
    pub fn add_similar_torrent(&mut self, infohash: Vec<u8>) -> Result<(), MetafileError> {
        if infohash.len() != 20 && infohash.len() != 32 {
            return Err(MetafileError::InvalidValue {
                field: "similar",
                reason: format!("infohash must be 20 or 32 bytes, got {}", infohash.len()),
            });
        }
        self.similar_torrents.insert(infohash);
        Ok(())
    }

    pub fn remove_similar_torrent(&mut self, infohash: &[u8]) {
        self.similar_torrents.remove(infohash);
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }

    pub fn add_collection(&mut self, collection: impl Into<String>) {
        self.collections.insert(collection.into());
    }

    pub fn remove_collection(&mut self, collection: &str) {
        self.collections.remove(collection);
    }

    //  Storage

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut FileStorage {
        &mut self.storage
    }

    pub fn set_storage(&mut self, storage: FileStorage) {
        self.storage = storage;
    }

    pub fn into_storage(self) -> FileStorage {
        self.storage
    }

    pub fn protocol(&self) -> Protocol {
        self.storage.protocol()
    }

    /// The display name: the explicit name, or the single file's name, or
    /// the root directory's name.
    pub fn effective_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match self.storage.file_mode() {
            crate::storage::FileMode::Single => self
                .storage
                .at(0)
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            _ => self
                .storage
                .root_directory()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}
