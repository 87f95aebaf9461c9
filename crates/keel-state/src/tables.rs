//! redb table definitions for the Keel state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized documents).

use redb::TableDefinition;

/// Version aggregates keyed by app name.
pub const APP_VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("app_versions");

/// Tracked control-plane replicas keyed by hostname.
pub const TRACKER: TableDefinition<&str, &[u8]> = TableDefinition::new("tracker");

/// Provisioner clusters keyed by cluster name.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("provisioner_clusters");
