use crate::errors::{EncodeError, StoreError};
use crate::etag;
use crate::metrics_defs::SNAPSHOT_REBUILDS;
use crate::negotiation::{MediaType, negotiate};
use crate::types::{DiscoveryDocument, GroupDiscovery, VersionRecord};
use crate::version::compare_versions;
use bytes::Bytes;
use parking_lot::RwLock;
use shared::counter;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Group name to its versions, kept in version priority order. Groups are
/// never stored with an empty version list.
type Groups = BTreeMap<String, Vec<VersionRecord>>;

/// Holds the snapshot for one content state. Whoever initializes it first
/// does the encoding; concurrent readers block on the same cell and reuse
/// the result.
type SnapshotSlot = OnceLock<Result<Arc<Snapshot>, EncodeError>>;

/// Immutable rendering of the merged document for one content state.
pub struct Snapshot {
    document: DiscoveryDocument,
    etag: String,
    json: Bytes,
    yaml: OnceLock<Result<Bytes, EncodeError>>,
}

impl Snapshot {
    fn build(groups: &Groups) -> Result<Self, EncodeError> {
        let document = build_document(groups);
        let json = serde_json::to_vec(&document).map_err(|e| EncodeError::Json(e.to_string()))?;

        Ok(Snapshot {
            etag: etag::compute(&json),
            json: Bytes::from(json),
            document,
            yaml: OnceLock::new(),
        })
    }

    /// Unquoted content hash of the canonical JSON encoding.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn document(&self) -> &DiscoveryDocument {
        &self.document
    }

    pub fn encode(&self, media_type: MediaType) -> Result<Bytes, EncodeError> {
        match media_type {
            MediaType::Json => Ok(self.json.clone()),
            MediaType::Yaml => self
                .yaml
                .get_or_init(|| {
                    serde_yaml::to_string(&self.document)
                        .map(Bytes::from)
                        .map_err(|e| EncodeError::Yaml(e.to_string()))
                })
                .clone(),
        }
    }
}

fn build_document(groups: &Groups) -> DiscoveryDocument {
    DiscoveryDocument::new(
        groups
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(name, versions)| GroupDiscovery::new(name.clone(), versions.clone()))
            .collect(),
    )
}

/// Deduplicates by version (last one wins) and sorts by version priority.
fn canonicalize(records: Vec<VersionRecord>) -> Vec<VersionRecord> {
    let mut canonical: Vec<VersionRecord> = Vec::with_capacity(records.len());
    for record in records {
        match canonical.iter_mut().find(|r| r.version == record.version) {
            Some(existing) => *existing = record,
            None => canonical.push(record),
        }
    }
    canonical.sort_by(|a, b| compare_versions(&a.version, &b.version));
    canonical
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Ok,
    NotModified,
}

#[derive(Debug, Clone)]
pub struct ReadResponse {
    pub status: ReadStatus,
    pub content_type: String,
    /// Empty for `NotModified`.
    pub body: Bytes,
    /// Unquoted.
    pub etag: String,
}

struct StoreState {
    groups: Arc<Groups>,
    snapshot: Arc<SnapshotSlot>,
}

/// Concurrency-safe cache of the merged discovery document.
///
/// Writers hold the exclusive lock only long enough to update the group map
/// and swap in an empty snapshot slot. Encoding and hashing happen outside
/// the lock, once per content state, on the first read that needs them.
pub struct DiscoveryStore {
    state: RwLock<StoreState>,
    rebuilds: AtomicU64,
}

impl Default for DiscoveryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryStore {
    pub fn new() -> Self {
        DiscoveryStore {
            state: RwLock::new(StoreState {
                groups: Arc::new(Groups::new()),
                snapshot: Arc::new(SnapshotSlot::new()),
            }),
            rebuilds: AtomicU64::new(0),
        }
    }

    /// Applies `op` to the group map. The cached snapshot is dropped only if
    /// `op` reports a content change.
    fn mutate(&self, op: impl FnOnce(&mut Groups) -> bool) -> bool {
        let mut state = self.state.write();
        // Copies the map only if a reader is still encoding the previous state
        let changed = op(Arc::make_mut(&mut state.groups));
        if changed {
            state.snapshot = Arc::new(SnapshotSlot::new());
        }
        changed
    }

    /// Replaces the whole document.
    pub fn set_groups(&self, groups: Vec<GroupDiscovery>) {
        let mut merged: BTreeMap<String, Vec<VersionRecord>> = BTreeMap::new();
        for group in groups {
            merged
                .entry(group.metadata.name)
                .or_default()
                .extend(group.versions);
        }
        let next: Groups = merged
            .into_iter()
            .map(|(name, versions)| (name, canonicalize(versions)))
            .filter(|(_, versions)| !versions.is_empty())
            .collect();

        let changed = self.mutate(|groups| {
            if *groups == next {
                return false;
            }
            *groups = next;
            true
        });
        tracing::debug!(changed, "replaced all groups");
    }

    /// Replaces every version of `group`. An empty list removes the group.
    pub fn replace(&self, group: &str, records: Vec<VersionRecord>) {
        let records = canonicalize(records);
        let changed = self.mutate(|groups| {
            if records.is_empty() {
                return groups.remove(group).is_some();
            }
            if groups.get(group) == Some(&records) {
                return false;
            }
            groups.insert(group.to_string(), records);
            true
        });
        tracing::debug!(group, changed, "replaced group");
    }

    /// Inserts or replaces one version of `group`, leaving its other versions
    /// untouched.
    pub fn upsert(&self, group: &str, record: VersionRecord) {
        let version = record.version.clone();
        let changed = self.mutate(|groups| {
            let versions = groups.entry(group.to_string()).or_default();
            match versions.iter_mut().find(|r| r.version == record.version) {
                Some(existing) if *existing == record => return false,
                Some(existing) => *existing = record,
                None => {
                    versions.push(record);
                    versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
                }
            }
            true
        });
        tracing::debug!(group, version = %version, changed, "upserted group version");
    }

    /// Removes one version of `group`, pruning the group when it was the last.
    /// Returns whether anything was removed.
    pub fn remove(&self, group: &str, version: &str) -> bool {
        let changed = self.mutate(|groups| {
            let Some(versions) = groups.get_mut(group) else {
                return false;
            };
            let before = versions.len();
            versions.retain(|r| r.version != version);
            if versions.len() == before {
                return false;
            }
            if versions.is_empty() {
                groups.remove(group);
            }
            true
        });
        tracing::debug!(group, version, changed, "removed group version");
        changed
    }

    /// The merged document as a value, without encoding it.
    pub fn document(&self) -> DiscoveryDocument {
        let groups = self.state.read().groups.clone();
        build_document(&groups)
    }

    /// Returns the snapshot of the current content, building it if needed.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, EncodeError> {
        let (groups, slot) = {
            let state = self.state.read();
            (state.groups.clone(), state.snapshot.clone())
        };

        slot.get_or_init(|| {
            self.rebuilds.fetch_add(1, Ordering::Relaxed);
            counter!(SNAPSHOT_REBUILDS).increment(1);
            let snapshot = Snapshot::build(&groups).map(Arc::new);
            if let Err(err) = &snapshot {
                tracing::error!(error = %err, "failed to encode discovery document");
            }
            snapshot
        })
        .clone()
    }

    /// Unquoted ETag of the current content.
    pub fn etag(&self) -> Result<String, EncodeError> {
        Ok(self.snapshot()?.etag().to_string())
    }

    /// Number of snapshot encodings performed so far.
    pub fn snapshot_rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Serves a read of the merged document.
    ///
    /// `accept` is the raw `Accept` header and `if_none_match` the raw
    /// `If-None-Match` header. A malformed `If-None-Match` is ignored.
    pub fn read(
        &self,
        accept: Option<&str>,
        if_none_match: Option<&str>,
    ) -> Result<ReadResponse, StoreError> {
        let media_type = negotiate(accept)?;
        let snapshot = self.snapshot()?;
        let etag = snapshot.etag().to_string();

        if etag::if_none_match_matches(if_none_match, &etag) {
            return Ok(ReadResponse {
                status: ReadStatus::NotModified,
                content_type: media_type.content_type(),
                body: Bytes::new(),
                etag,
            });
        }

        Ok(ReadResponse {
            status: ReadStatus::Ok,
            content_type: media_type.content_type(),
            body: snapshot.encode(media_type)?,
            etag,
        })
    }
}
