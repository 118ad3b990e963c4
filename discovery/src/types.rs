//! Wire shapes of the aggregated discovery format and of the legacy
//! per-group-version resource listing it replaces.

use serde::{Deserialize, Serialize};

pub const DISCOVERY_GROUP: &str = "apidiscovery.k8s.io";
pub const DISCOVERY_VERSION: &str = "v2beta1";
pub const DISCOVERY_LIST_KIND: &str = "APIGroupDiscoveryList";

/// Whether a version record was produced by the backend's own aggregated
/// discovery (`Current`) or is a retained copy from an earlier pull that the
/// backend currently fails to refresh (`Stale`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    #[default]
    Current,
    Stale,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Cluster,
    Namespaced,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubresourceDiscovery {
    pub subresource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_kind: Option<GroupVersionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_types: Vec<GroupVersionKind>,
    #[serde(default)]
    pub verbs: Vec<String>,
}

/// One resource served by a group version. The store treats it as an opaque
/// value; only equality and serialization matter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDiscovery {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_kind: Option<GroupVersionKind>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub singular_resource: String,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subresources: Vec<SubresourceDiscovery>,
}

impl ResourceDiscovery {
    pub fn new<R: Into<String>>(resource: R) -> Self {
        ResourceDiscovery {
            resource: resource.into(),
            ..Default::default()
        }
    }
}

/// The capability record of a single group version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    #[serde(default)]
    pub resources: Vec<ResourceDiscovery>,
    #[serde(default)]
    pub freshness: Freshness,
}

impl VersionRecord {
    pub fn new<V: Into<String>>(version: V, resources: Vec<ResourceDiscovery>) -> Self {
        VersionRecord {
            version: version.into(),
            resources,
            freshness: Freshness::Current,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMeta {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDiscovery {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

impl GroupDiscovery {
    pub fn new<N: Into<String>>(name: N, versions: Vec<VersionRecord>) -> Self {
        GroupDiscovery {
            metadata: ObjectMeta { name: name.into() },
            versions,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// The merged document served to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<GroupDiscovery>,
}

impl DiscoveryDocument {
    pub fn new(items: Vec<GroupDiscovery>) -> Self {
        DiscoveryDocument {
            kind: DISCOVERY_LIST_KIND.to_string(),
            api_version: format!("{DISCOVERY_GROUP}/{DISCOVERY_VERSION}"),
            metadata: ListMeta {},
            items,
        }
    }

    pub fn group(&self, name: &str) -> Option<&GroupDiscovery> {
        self.items.iter().find(|group| group.name() == name)
    }

    pub fn find(&self, group: &str, version: &str) -> Option<&VersionRecord> {
        self.group(group)?
            .versions
            .iter()
            .find(|record| record.version == version)
    }
}

impl Default for DiscoveryDocument {
    fn default() -> Self {
        DiscoveryDocument::new(Vec::new())
    }
}

/// A resource as listed by the legacy `/apis/<group>/<version>` endpoint.
/// Subresources appear as separate entries named `parent/sub`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyResource {
    pub name: String,
    #[serde(default)]
    pub singular_name: String,
    #[serde(default)]
    pub namespaced: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyResourceList {
    #[serde(default)]
    pub group_version: String,
    #[serde(default)]
    pub resources: Vec<LegacyResource>,
}
