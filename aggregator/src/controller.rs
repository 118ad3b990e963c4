use crate::backend::{DiscoveryBackend, PullError};
use crate::metrics_defs::{LEGACY_FALLBACKS, PULL_DURATION, PULL_FAILURES, SOURCES};
use discovery::{DiscoveryStore, Freshness, VersionRecord, convert_legacy_listing};
use indexmap::IndexMap;
use parking_lot::RwLock;
use shared::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    /// Registered or failed, waiting for a pull.
    Dirty,
    /// Last pull succeeded and was merged into the store.
    Synced,
}

struct SourceEntry {
    group: String,
    version: String,
    backend: Arc<dyn DiscoveryBackend>,
    state: SourceState,
    // Bumped on every registration. Pull results of an older generation are dropped.
    generation: u64,
    // Ticket of the newest pull applied, so a slow pull never overwrites a newer one.
    applied_ticket: u64,
    last_record: Option<VersionRecord>,
}

impl SourceEntry {
    fn claims(&self, group: &str, version: &str) -> bool {
        self.group == group && self.version == version
    }
}

struct PullTarget {
    identity: String,
    group: String,
    version: String,
    backend: Arc<dyn DiscoveryBackend>,
    generation: u64,
}

struct Pulled {
    record: VersionRecord,
    via_legacy: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    All,
    DirtyOnly,
}

struct Inner {
    store: Arc<DiscoveryStore>,
    // Lock order: sources first, then the store's own lock.
    sources: RwLock<IndexMap<String, SourceEntry>>,
    dirty: Notify,
    synced: watch::Sender<bool>,
    sync_interval: Duration,
    sequence: AtomicU64,
}

/// Keeps the merged document in a [`DiscoveryStore`] in line with the
/// registered backend sources.
///
/// Sources are kept in registration order. When two sources claim the same
/// group version, the latest-registered synced one wins regardless of the
/// order their pulls complete in.
#[derive(Clone)]
pub struct AggregationController {
    inner: Arc<Inner>,
}

impl AggregationController {
    pub fn new(store: Arc<DiscoveryStore>, sync_interval: Duration) -> Self {
        let (synced, _) = watch::channel(false);
        AggregationController {
            inner: Arc::new(Inner {
                store,
                sources: RwLock::new(IndexMap::new()),
                dirty: Notify::new(),
                synced,
                sync_interval,
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<DiscoveryStore> {
        &self.inner.store
    }

    fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds or updates a source.
    ///
    /// Local backends are pulled before this returns, so their data is
    /// visible as soon as the call completes. Remote backends are marked
    /// dirty and picked up by the background loop.
    pub async fn register_source(
        &self,
        identity: &str,
        group: &str,
        version: &str,
        backend: Arc<dyn DiscoveryBackend>,
    ) {
        let target = {
            let mut sources = self.inner.sources.write();

            let mut last_record = None;
            let mut retracted = None;
            if let Some(existing) = sources.get(identity) {
                if existing.claims(group, version) {
                    if Arc::ptr_eq(&existing.backend, &backend) {
                        tracing::debug!(identity, "source registration unchanged");
                        return;
                    }
                    last_record = existing.last_record.clone();
                } else {
                    retracted = Some((existing.group.clone(), existing.version.clone()));
                }
            }

            if let Some((other, _)) = sources
                .iter()
                .find(|(other, entry)| other.as_str() != identity && entry.claims(group, version))
            {
                tracing::warn!(
                    identity,
                    other = %other,
                    group,
                    version,
                    "group version claimed by more than one source, the later registration wins"
                );
            }

            let generation = self.next_sequence();
            sources.insert(
                identity.to_string(),
                SourceEntry {
                    group: group.to_string(),
                    version: version.to_string(),
                    backend: backend.clone(),
                    state: SourceState::Dirty,
                    generation,
                    applied_ticket: 0,
                    last_record,
                },
            );
            if let Some((old_group, old_version)) = retracted {
                self.retract(&mut sources, &old_group, &old_version);
            }
            gauge!(SOURCES).set(sources.len() as f64);
            tracing::info!(identity, group, version, "registered source");

            PullTarget {
                identity: identity.to_string(),
                group: group.to_string(),
                version: version.to_string(),
                backend,
                generation,
            }
        };

        if target.backend.is_local() {
            self.pull_and_apply(target).await;
        } else {
            self.inner.dirty.notify_one();
        }
    }

    /// Deletes a source and retracts its record. Returns whether the source
    /// was registered.
    pub fn remove_source(&self, identity: &str) -> bool {
        let mut sources = self.inner.sources.write();
        let Some(entry) = sources.shift_remove(identity) else {
            return false;
        };

        self.retract(&mut sources, &entry.group, &entry.version);
        gauge!(SOURCES).set(sources.len() as f64);
        tracing::info!(
            identity,
            group = %entry.group,
            version = %entry.version,
            "removed source"
        );
        true
    }

    /// Called once a source no longer claims a group version. Remaining
    /// claimants are queued for a fresh pull and the store falls back to
    /// whatever they last reported.
    fn retract(&self, sources: &mut IndexMap<String, SourceEntry>, group: &str, version: &str) {
        let mut claimed = false;
        for entry in sources
            .values_mut()
            .filter(|entry| entry.claims(group, version))
        {
            claimed = true;
            entry.state = SourceState::Dirty;
        }

        self.publish(sources, group, version);
        if claimed {
            self.inner.dirty.notify_one();
        }
    }

    /// Brings the store in line with the source table for one group version.
    ///
    /// The latest-registered synced claimant wins. Without one, the
    /// latest-registered claimant with a known record is served as it last
    /// was. Without any, the group version is removed.
    fn publish(&self, sources: &IndexMap<String, SourceEntry>, group: &str, version: &str) {
        let claimants = || sources.values().rev().filter(|entry| entry.claims(group, version));
        let selected = claimants()
            .find(|entry| entry.state == SourceState::Synced)
            .or_else(|| claimants().find(|entry| entry.last_record.is_some()))
            .and_then(|entry| entry.last_record.clone());

        match selected {
            Some(record) => self.inner.store.upsert(group, record),
            None => {
                self.inner.store.remove(group, version);
            }
        }
    }

    pub fn source_state(&self, identity: &str) -> Option<SourceState> {
        self.inner
            .sources
            .read()
            .get(identity)
            .map(|entry| entry.state)
    }

    pub fn source_count(&self) -> usize {
        self.inner.sources.read().len()
    }

    pub fn is_synced(&self) -> bool {
        *self.inner.synced.borrow()
    }

    /// Flips to `true` once a full pass over all registered sources has
    /// completed. Never flips back.
    pub fn synced_signal(&self) -> watch::Receiver<bool> {
        self.inner.synced.subscribe()
    }

    pub async fn wait_synced(&self) {
        let mut signal = self.synced_signal();
        // The sender lives as long as the controller, so this cannot fail
        let _ = signal.wait_for(|synced| *synced).await;
    }

    /// Performs the first full pass, then hands the periodic loop to a
    /// background task which runs until `shutdown` turns `true` or its
    /// sender is dropped.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tracing::info!(sources = self.source_count(), "starting initial sync");
        if self.sync_pass(Pass::All, &shutdown).await {
            self.inner.synced.send_replace(true);
            tracing::info!("initial sync complete");
        }

        let controller = self.clone();
        tokio::spawn(controller.sync_loop(shutdown))
    }

    async fn sync_loop(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.inner.sync_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pass = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => Pass::All,
                _ = self.inner.dirty.notified() => Pass::DirtyOnly,
            };

            let completed = self.sync_pass(pass, &shutdown).await;
            if completed && pass == Pass::All && !self.is_synced() {
                self.inner.synced.send_replace(true);
            }
        }

        tracing::info!("sync loop stopped");
    }

    /// Pulls every source selected by `pass` in registration order. Returns
    /// `false` if shutdown was observed before all of them were attempted.
    async fn sync_pass(&self, pass: Pass, shutdown: &watch::Receiver<bool>) -> bool {
        let targets: Vec<PullTarget> = {
            let sources = self.inner.sources.read();
            sources
                .iter()
                .filter(|(_, entry)| pass == Pass::All || entry.state == SourceState::Dirty)
                .map(|(identity, entry)| PullTarget {
                    identity: identity.clone(),
                    group: entry.group.clone(),
                    version: entry.version.clone(),
                    backend: entry.backend.clone(),
                    generation: entry.generation,
                })
                .collect()
        };

        tracing::debug!(?pass, sources = targets.len(), "starting sync pass");
        for target in targets {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested, abandoning sync pass");
                return false;
            }
            self.pull_and_apply(target).await;
        }
        true
    }

    async fn pull_and_apply(&self, target: PullTarget) {
        let ticket = self.next_sequence();
        let started = Instant::now();
        let result = pull(&target).await;

        let outcome = match &result {
            Ok(pulled) if pulled.via_legacy => "legacy",
            Ok(_) => "success",
            Err(_) => "failure",
        };
        histogram!(PULL_DURATION, "outcome" => outcome).record(started.elapsed().as_secs_f64());

        self.apply(&target, ticket, result);
    }

    fn apply(&self, target: &PullTarget, ticket: u64, result: Result<Pulled, PullError>) {
        let mut sources = self.inner.sources.write();

        let Some(entry) = sources.get_mut(&target.identity) else {
            tracing::debug!(identity = %target.identity, "source removed during pull, discarding result");
            return;
        };
        if entry.generation != target.generation || entry.applied_ticket > ticket {
            tracing::debug!(identity = %target.identity, "source changed during pull, discarding result");
            return;
        }
        entry.applied_ticket = ticket;

        match result {
            Ok(Pulled { record, .. }) => {
                tracing::debug!(identity = %target.identity, "pulled source");
                entry.state = SourceState::Synced;
                entry.last_record = Some(record);
            }
            Err(err) => {
                counter!(PULL_FAILURES).increment(1);
                tracing::warn!(
                    identity = %target.identity,
                    group = %target.group,
                    version = %target.version,
                    error = %err,
                    "failed to pull source"
                );
                entry.state = SourceState::Dirty;
                if let Some(record) = entry.last_record.as_mut() {
                    record.freshness = Freshness::Stale;
                }
            }
        }

        self.publish(&sources, &target.group, &target.version);
    }
}

/// Pulls the aggregated record, falling back to the legacy listing when the
/// aggregated path yields nothing.
async fn pull(target: &PullTarget) -> Result<Pulled, PullError> {
    let aggregated = match target.backend.aggregated().await {
        Ok(document) => document
            .find(&target.group, &target.version)
            .cloned()
            .ok_or_else(|| PullError::GroupVersionNotFound {
                group: target.group.clone(),
                version: target.version.clone(),
            }),
        Err(err) => Err(err),
    };

    let aggregated_err = match aggregated {
        Ok(record) => {
            return Ok(Pulled {
                record,
                via_legacy: false,
            });
        }
        Err(err) => err,
    };

    tracing::debug!(
        identity = %target.identity,
        reason = %aggregated_err,
        "falling back to legacy discovery"
    );
    counter!(LEGACY_FALLBACKS).increment(1);

    let listing = match target.backend.legacy(&target.group, &target.version).await {
        Ok(listing) => listing,
        // Report whatever went wrong first unless it only said "try legacy"
        Err(legacy_err) => {
            return Err(match aggregated_err {
                PullError::NotAggregated => legacy_err,
                err => err,
            });
        }
    };

    let record = convert_legacy_listing(&target.group, &target.version, &listing.resources)?;
    Ok(Pulled {
        record,
        via_legacy: true,
    })
}
