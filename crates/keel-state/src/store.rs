//! StateStore: redb-backed persistence for Keel.
//!
//! Provides typed operations over app version aggregates, tracked
//! instances and provisioner clusters. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use keel_core::{Clock, SystemClock};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::traits::{ClusterStore, InstanceStore, VersionStore};
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Replace the clock used for `updated_at` and staleness cut-offs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(TRACKER).map_err(map_err!(Table))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Rotate the CAS token and advance `updated_at`, never backwards.
    fn touch(&self, doc: &mut AppVersions) {
        let now = self.clock.now();
        if now > doc.updated_at {
            doc.updated_at = now;
        }
        doc.updated_hash = Uuid::new_v4().to_string();
    }

    /// Apply `change` to an existing aggregate in one write transaction.
    ///
    /// The guard in `opts` is checked against the stored hash before
    /// `change` runs. Returning early drops the transaction, which aborts it.
    fn mutate_versions<F>(&self, app: &str, opts: &WriteOptions, change: F) -> StateResult<AppVersions>
    where
        F: FnOnce(&mut AppVersions, DateTime<Utc>) -> StateResult<()>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let doc;
        {
            let mut table = txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
            let current: Option<AppVersions> = match table.get(app).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let mut current = current.ok_or_else(|| StateError::NotFound(app.to_string()))?;
            if let Some(expected) = opts.guard() {
                if expected != current.updated_hash {
                    return Err(StateError::HashMismatch(app.to_string()));
                }
            }
            change(&mut current, self.clock.now())?;
            self.touch(&mut current);
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(app, value.as_slice())
                .map_err(map_err!(Write))?;
            doc = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(doc)
    }

    fn put_version(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
        successful: bool,
    ) -> StateResult<()> {
        let doc = self.mutate_versions(app, opts, |doc, now| {
            if info.version == 0 || info.version > doc.count {
                return Err(StateError::UnallocatedVersion {
                    app: app.to_string(),
                    version: info.version,
                });
            }
            let mut info = info.clone();
            info.updated_at = Some(now);
            if successful {
                doc.last_successful_version = info.version;
            }
            doc.versions.insert(info.version, info);
            Ok(())
        })?;
        debug!(
            %app,
            version = info.version,
            successful,
            hash = %doc.updated_hash,
            "app version updated"
        );
        Ok(())
    }
}

impl VersionStore for StateStore {
    fn new_app_version(&self, args: &NewVersionArgs) -> StateResult<AppVersionInfo> {
        let app = args.app.as_str();
        let now = self.clock.now();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let info;
        {
            let mut table = txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
            let current: Option<AppVersions> = match table.get(app).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let mut doc = current.unwrap_or_else(|| AppVersions {
                app_name: app.to_string(),
                count: 0,
                last_successful_version: 0,
                versions: Default::default(),
                updated_at: now,
                updated_hash: String::new(),
                marked_to_removal: false,
            });
            doc.count += 1;
            let new_info = AppVersionInfo {
                version: doc.count,
                description: args.description.clone(),
                event_id: args.event_id.clone(),
                custom_build_tag: args.custom_build_tag.clone(),
                created_at: Some(now),
                updated_at: Some(now),
                ..Default::default()
            };
            doc.versions.insert(new_info.version, new_info.clone());
            self.touch(&mut doc);
            let value = serde_json::to_vec(&doc).map_err(map_err!(Serialize))?;
            table
                .insert(app, value.as_slice())
                .map_err(map_err!(Write))?;
            info = new_info;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%app, version = info.version, "app version allocated");
        Ok(info)
    }

    fn app_versions(&self, app: &str) -> StateResult<Option<AppVersions>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
        match table.get(app).map_err(map_err!(Read))? {
            Some(guard) => {
                let doc: AppVersions =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn all_app_versions(&self, app_filter: &[String]) -> StateResult<Vec<AppVersions>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_VERSIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !app_filter.is_empty() && !app_filter.iter().any(|a| a == key.value()) {
                continue;
            }
            let doc: AppVersions =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(doc);
        }
        Ok(results)
    }

    fn update_version(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> StateResult<()> {
        self.put_version(app, info, opts, false)
    }

    fn update_version_success(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> StateResult<()> {
        self.put_version(app, info, opts, true)
    }

    fn delete_version_ids(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> StateResult<()> {
        self.mutate_versions(app, opts, |doc, _| {
            for version in versions {
                doc.versions.remove(version);
            }
            Ok(())
        })?;
        debug!(%app, ?versions, "app versions deleted");
        Ok(())
    }

    fn mark_versions_to_removal(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> StateResult<()> {
        self.mutate_versions(app, opts, |doc, now| {
            // A vanished entry means the caller's view is out of date.
            if versions.iter().any(|v| !doc.versions.contains_key(v)) {
                return Err(match opts.guard() {
                    Some(_) => StateError::HashMismatch(app.to_string()),
                    None => StateError::NotFound(app.to_string()),
                });
            }
            for version in versions {
                if let Some(info) = doc.versions.get_mut(version) {
                    info.marked_to_removal = true;
                    info.updated_at = Some(now);
                }
            }
            Ok(())
        })?;
        debug!(%app, ?versions, "app versions marked to removal");
        Ok(())
    }

    fn mark_to_removal(&self, app: &str, opts: &WriteOptions) -> StateResult<()> {
        self.mutate_versions(app, opts, |doc, _| {
            doc.marked_to_removal = true;
            Ok(())
        })?;
        debug!(%app, "app versions marked to removal");
        Ok(())
    }

    fn delete_versions(&self, app: &str, opts: &WriteOptions) -> StateResult<()> {
        let result = self.mutate_versions(app, opts, |doc, _| {
            doc.versions.clear();
            doc.last_successful_version = 0;
            doc.marked_to_removal = false;
            Ok(())
        });
        match result {
            Ok(_) => {
                debug!(%app, "app versions cleared");
                Ok(())
            }
            // A guarded write that matches nothing lost a race.
            Err(StateError::NotFound(_)) if opts.guard().is_some() => {
                Err(StateError::HashMismatch(app.to_string()))
            }
            Err(StateError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl InstanceStore for StateStore {
    fn notify(&self, instance: &TrackedInstance) -> StateResult<()> {
        let value = serde_json::to_vec(instance).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TRACKER).map_err(map_err!(Table))?;
            table
                .insert(instance.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn list_live(&self, stale_timeout: Duration) -> StateResult<Vec<TrackedInstance>> {
        let now = self.clock.now();
        let cutoff = TimeDelta::from_std(stale_timeout)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TRACKER).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let instance: TrackedInstance =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if instance.last_update > cutoff {
                results.push(instance);
            }
        }
        Ok(results)
    }
}

impl ClusterStore for StateStore {
    fn upsert_cluster(&self, cluster: &Cluster) -> StateResult<()> {
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(cluster.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %cluster.name, "cluster stored");
        Ok(())
    }

    fn get_cluster(&self, name: &str) -> StateResult<Option<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let cluster: Cluster =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(cluster))
            }
            None => Ok(None),
        }
    }

    fn list_clusters(&self) -> StateResult<Vec<Cluster>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let cluster: Cluster =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(cluster);
        }
        Ok(results)
    }

    fn delete_cluster(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %name, existed, "cluster deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keel_core::ManualClock;
    use std::collections::HashSet;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn new_version(store: &StateStore, app: &str) -> AppVersionInfo {
        store
            .new_app_version(&NewVersionArgs {
                app: app.to_string(),
                description: "test".to_string(),
                event_id: "E1".to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    fn hash_of(store: &StateStore, app: &str) -> String {
        store.app_versions(app).unwrap().unwrap().updated_hash
    }

    // ── App versions ───────────────────────────────────────────────

    #[test]
    fn new_app_version_allocates_sequential_numbers() {
        let store = test_store();
        assert_eq!(new_version(&store, "myapp").version, 1);
        assert_eq!(new_version(&store, "myapp").version, 2);
        assert_eq!(new_version(&store, "other").version, 1);

        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.count, 2);
        assert_eq!(doc.versions.len(), 2);
        assert_eq!(doc.get(1).unwrap().event_id, "E1");
        assert!(!doc.updated_hash.is_empty());
    }

    #[test]
    fn missing_aggregate_is_none() {
        let store = test_store();
        assert!(store.app_versions("ghost").unwrap().is_none());
        let err = store
            .update_version("ghost", &AppVersionInfo::default(), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn deleted_numbers_are_never_reused() {
        let store = test_store();
        new_version(&store, "myapp");
        new_version(&store, "myapp");
        store
            .delete_version_ids("myapp", &[2], &WriteOptions::default())
            .unwrap();
        assert_eq!(new_version(&store, "myapp").version, 3);

        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.count, 3);
        assert!(doc.versions.keys().all(|v| *v <= doc.count));
        assert!(doc.get(2).is_none());
    }

    #[test]
    fn every_mutation_rotates_hash() {
        let store = test_store();
        let info = new_version(&store, "myapp");
        let mut seen = HashSet::new();
        seen.insert(hash_of(&store, "myapp"));

        store
            .update_version("myapp", &info, &WriteOptions::default())
            .unwrap();
        assert!(seen.insert(hash_of(&store, "myapp")));
        store
            .mark_versions_to_removal("myapp", &[1], &WriteOptions::default())
            .unwrap();
        assert!(seen.insert(hash_of(&store, "myapp")));
        store
            .mark_to_removal("myapp", &WriteOptions::default())
            .unwrap();
        assert!(seen.insert(hash_of(&store, "myapp")));
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = test_store().with_clock(clock.clone());
        let info = new_version(&store, "myapp");
        clock.set(start - TimeDelta::hours(1));
        store
            .update_version("myapp", &info, &WriteOptions::default())
            .unwrap();
        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.updated_at, start);
    }

    #[test]
    fn update_version_success_advances_pointer() {
        let store = test_store();
        let mut info = new_version(&store, "myapp");
        info.deploy_successful = true;
        store
            .update_version_success("myapp", &info, &WriteOptions::default())
            .unwrap();
        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.last_successful_version, 1);
        assert!(doc.get(1).unwrap().deploy_successful);
    }

    #[test]
    fn failed_success_update_leaves_pointer() {
        let store = test_store();
        let info = new_version(&store, "myapp");
        let err = store
            .update_version_success("myapp", &info, &WriteOptions::guarded("stale"))
            .unwrap_err();
        assert!(matches!(err, StateError::HashMismatch(_)));
        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.last_successful_version, 0);
    }

    #[test]
    fn update_rejects_unallocated_version() {
        let store = test_store();
        new_version(&store, "myapp");
        let info = AppVersionInfo {
            version: 7,
            ..Default::default()
        };
        let err = store
            .update_version("myapp", &info, &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, StateError::UnallocatedVersion { version: 7, .. }));
    }

    #[test]
    fn concurrent_guarded_deletes_one_wins() {
        let store = test_store();
        new_version(&store, "myapp");
        new_version(&store, "myapp");
        let hash = hash_of(&store, "myapp");
        let count_before = store.app_versions("myapp").unwrap().unwrap().count;

        store
            .delete_version_ids("myapp", &[2], &WriteOptions::guarded(hash.clone()))
            .unwrap();
        let winner_hash = hash_of(&store, "myapp");
        let err = store
            .delete_version_ids("myapp", &[1], &WriteOptions::guarded(hash))
            .unwrap_err();
        assert!(matches!(err, StateError::HashMismatch(_)));

        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert!(doc.get(1).is_some());
        assert!(doc.get(2).is_none());
        assert_eq!(doc.count, count_before);
        assert_eq!(doc.updated_hash, winner_hash);
    }

    #[test]
    fn racing_threads_with_same_guard() {
        let store = test_store();
        for _ in 0..4 {
            new_version(&store, "myapp");
        }
        let hash = hash_of(&store, "myapp");
        let handles: Vec<_> = (1..=4u32)
            .map(|v| {
                let store = store.clone();
                let hash = hash.clone();
                std::thread::spawn(move || {
                    store.delete_version_ids("myapp", &[v], &WriteOptions::guarded(hash))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, StateError::HashMismatch(_)))
        );
        assert_eq!(store.app_versions("myapp").unwrap().unwrap().versions.len(), 3);
    }

    #[test]
    fn delete_version_ids_is_idempotent() {
        let store = test_store();
        new_version(&store, "myapp");
        new_version(&store, "myapp");
        store
            .delete_version_ids("myapp", &[1], &WriteOptions::default())
            .unwrap();
        store
            .delete_version_ids("myapp", &[1], &WriteOptions::default())
            .unwrap();
        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert!(doc.get(1).is_none());
        assert!(doc.get(2).is_some());
    }

    #[test]
    fn mark_versions_requires_existing_entries() {
        let store = test_store();
        new_version(&store, "myapp");
        let err = store
            .mark_versions_to_removal("myapp", &[1, 5], &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));

        let hash = hash_of(&store, "myapp");
        let err = store
            .mark_versions_to_removal("myapp", &[5], &WriteOptions::guarded(hash))
            .unwrap_err();
        assert!(matches!(err, StateError::HashMismatch(_)));

        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert!(!doc.get(1).unwrap().marked_to_removal);
    }

    #[test]
    fn mark_to_removal_is_idempotent() {
        let store = test_store();
        new_version(&store, "myapp");
        store
            .mark_to_removal("myapp", &WriteOptions::default())
            .unwrap();
        let first = store.app_versions("myapp").unwrap().unwrap();
        store
            .mark_to_removal("myapp", &WriteOptions::default())
            .unwrap();
        let second = store.app_versions("myapp").unwrap().unwrap();
        assert!(first.marked_to_removal && second.marked_to_removal);
        assert_eq!(first.versions, second.versions);
        assert_eq!(first.count, second.count);
    }

    #[test]
    fn delete_versions_keeps_counter() {
        let store = test_store();
        let mut info = new_version(&store, "myapp");
        info.deploy_successful = true;
        store
            .update_version_success("myapp", &info, &WriteOptions::default())
            .unwrap();
        store
            .mark_to_removal("myapp", &WriteOptions::default())
            .unwrap();
        store
            .delete_versions("myapp", &WriteOptions::default())
            .unwrap();

        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert!(doc.versions.is_empty());
        assert_eq!(doc.count, 1);
        assert_eq!(doc.last_successful_version, 0);
        assert!(!doc.marked_to_removal);
        assert_eq!(new_version(&store, "myapp").version, 2);

        store
            .delete_versions("ghost", &WriteOptions::default())
            .unwrap();
        let err = store
            .delete_versions("ghost", &WriteOptions::guarded("some-hash"))
            .unwrap_err();
        assert!(matches!(err, StateError::HashMismatch(app) if app == "ghost"));
    }

    #[test]
    fn all_app_versions_with_filter() {
        let store = test_store();
        new_version(&store, "a");
        new_version(&store, "b");
        new_version(&store, "c");
        assert_eq!(store.all_app_versions(&[]).unwrap().len(), 3);
        let names: Vec<_> = store
            .all_app_versions(&["a".to_string(), "c".to_string()])
            .unwrap()
            .into_iter()
            .map(|d| d.app_name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    // ── Tracker ────────────────────────────────────────────────────

    #[test]
    fn live_instances_respect_stale_timeout() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = test_store().with_clock(clock.clone());
        let stale = Duration::from_millis(500);

        let instance = TrackedInstance {
            name: "host1".into(),
            addresses: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            port: "8080".into(),
            tls_port: String::new(),
            last_update: clock.now(),
        };
        store.notify(&instance).unwrap();

        clock.advance(Duration::from_millis(100));
        assert_eq!(store.list_live(stale).unwrap(), vec![instance.clone()]);

        clock.advance(Duration::from_millis(900));
        assert!(store.list_live(stale).unwrap().is_empty());

        let refreshed = TrackedInstance {
            last_update: clock.now(),
            ..instance
        };
        store.notify(&refreshed).unwrap();
        assert_eq!(store.list_live(stale).unwrap(), vec![refreshed]);
    }

    // ── Clusters ───────────────────────────────────────────────────

    #[test]
    fn cluster_crud() {
        let store = test_store();
        let cluster = Cluster {
            name: "c1".into(),
            provisioner: "kubernetes".into(),
            pools: vec!["poolA".into()],
            ..Default::default()
        };
        store.upsert_cluster(&cluster).unwrap();
        assert_eq!(store.get_cluster("c1").unwrap(), Some(cluster.clone()));
        assert_eq!(store.clusters_for_provisioner("kubernetes").unwrap().len(), 1);
        assert!(store.clusters_for_provisioner("swarm").unwrap().is_empty());
        assert!(store.delete_cluster("c1").unwrap());
        assert!(!store.delete_cluster("c1").unwrap());
        assert!(store.list_clusters().unwrap().is_empty());
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.redb");
        {
            let store = StateStore::open(&path).unwrap();
            new_version(&store, "myapp");
            new_version(&store, "myapp");
        }
        let store = StateStore::open(&path).unwrap();
        let doc = store.app_versions("myapp").unwrap().unwrap();
        assert_eq!(doc.count, 2);
        assert_eq!(new_version(&store, "myapp").version, 3);
    }
}
