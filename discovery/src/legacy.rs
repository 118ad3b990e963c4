//! Conversion of a legacy per-group-version resource listing into the
//! aggregated record shape.

use crate::types::{
    Freshness, GroupVersionKind, LegacyResource, ResourceDiscovery, Scope, SubresourceDiscovery,
    VersionRecord,
};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LegacyConversionError {
    #[error("invalid subresource name: {0}")]
    InvalidSubresource(String),
}

fn scope_of(resource: &LegacyResource) -> Scope {
    if resource.namespaced {
        Scope::Namespaced
    } else {
        Scope::Cluster
    }
}

fn kind_of(resource: &LegacyResource, group: &str, version: &str) -> GroupVersionKind {
    let pick = |own: &str, fallback: &str| {
        if own.is_empty() {
            fallback.to_string()
        } else {
            own.to_string()
        }
    };

    GroupVersionKind {
        group: pick(&resource.group, group),
        version: pick(&resource.version, version),
        kind: resource.kind.clone(),
    }
}

/// Builds the aggregated record for `group`/`version` from a legacy listing.
///
/// Resources keep their listing order. Subresources (`parent/sub`) are folded
/// into their parent; a subresource listed without its parent gets a bare
/// placeholder parent so that no information is dropped.
pub fn convert_legacy_listing(
    group: &str,
    version: &str,
    resources: &[LegacyResource],
) -> Result<VersionRecord, LegacyConversionError> {
    let mut converted: Vec<ResourceDiscovery> = Vec::new();
    let mut parents: HashMap<String, usize> = HashMap::new();

    for resource in resources.iter().filter(|r| !r.name.contains('/')) {
        converted.push(ResourceDiscovery {
            resource: resource.name.clone(),
            response_kind: Some(kind_of(resource, group, version)),
            scope: scope_of(resource),
            singular_resource: resource.singular_name.clone(),
            verbs: resource.verbs.clone(),
            short_names: resource.short_names.clone(),
            categories: resource.categories.clone(),
            subresources: Vec::new(),
        });
        parents.insert(resource.name.clone(), converted.len() - 1);
    }

    for resource in resources.iter().filter(|r| r.name.contains('/')) {
        let (parent, sub) = resource
            .name
            .split_once('/')
            .filter(|(parent, sub)| !parent.is_empty() && !sub.is_empty())
            .ok_or_else(|| LegacyConversionError::InvalidSubresource(resource.name.clone()))?;

        let subresource = SubresourceDiscovery {
            subresource: sub.to_string(),
            response_kind: (!resource.kind.is_empty())
                .then(|| kind_of(resource, group, version)),
            accepted_types: Vec::new(),
            verbs: resource.verbs.clone(),
        };

        let idx = match parents.get(parent) {
            Some(idx) => *idx,
            None => {
                converted.push(ResourceDiscovery {
                    resource: parent.to_string(),
                    scope: scope_of(resource),
                    ..Default::default()
                });
                parents.insert(parent.to_string(), converted.len() - 1);
                converted.len() - 1
            }
        };
        converted[idx].subresources.push(subresource);
    }

    Ok(VersionRecord {
        version: version.to_string(),
        resources: converted,
        freshness: Freshness::Current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foos() -> LegacyResource {
        LegacyResource {
            name: "foos".into(),
            singular_name: "foo".into(),
            namespaced: false,
            group: "stable.example.com".into(),
            version: "v1".into(),
            kind: "Foo".into(),
            verbs: vec!["get".into(), "list".into(), "watch".into()],
            short_names: vec![],
            categories: vec!["all".into()],
        }
    }

    #[test]
    fn test_convert_top_level_resource() {
        let record = convert_legacy_listing("stable.example.com", "v1", &[foos()]).unwrap();

        assert_eq!(record.version, "v1");
        assert_eq!(record.freshness, Freshness::Current);
        assert_eq!(
            record.resources,
            vec![ResourceDiscovery {
                resource: "foos".into(),
                response_kind: Some(GroupVersionKind {
                    group: "stable.example.com".into(),
                    version: "v1".into(),
                    kind: "Foo".into(),
                }),
                scope: Scope::Cluster,
                singular_resource: "foo".into(),
                verbs: vec!["get".into(), "list".into(), "watch".into()],
                short_names: vec![],
                categories: vec!["all".into()],
                subresources: vec![],
            }]
        );
    }

    #[test]
    fn test_subresources_attach_to_parent() {
        let status = LegacyResource {
            name: "foos/status".into(),
            kind: "Foo".into(),
            verbs: vec!["get".into(), "patch".into()],
            ..Default::default()
        };
        let scale = LegacyResource {
            name: "foos/scale".into(),
            group: "autoscaling".into(),
            version: "v1".into(),
            kind: "Scale".into(),
            verbs: vec!["get".into()],
            ..Default::default()
        };

        // Subresources listed before the parent still attach to it
        let record =
            convert_legacy_listing("stable.example.com", "v1", &[status, foos(), scale]).unwrap();

        assert_eq!(record.resources.len(), 1);
        let subresources = &record.resources[0].subresources;
        assert_eq!(subresources.len(), 2);
        assert_eq!(subresources[0].subresource, "status");
        // Missing group/version is inherited from the listing
        assert_eq!(
            subresources[0].response_kind,
            Some(GroupVersionKind {
                group: "stable.example.com".into(),
                version: "v1".into(),
                kind: "Foo".into(),
            })
        );
        assert_eq!(
            subresources[1].response_kind.as_ref().unwrap().group,
            "autoscaling"
        );
    }

    #[test]
    fn test_orphan_subresource_gets_placeholder_parent() {
        let orphan = LegacyResource {
            name: "bars/status".into(),
            namespaced: true,
            verbs: vec!["get".into()],
            ..Default::default()
        };

        let record = convert_legacy_listing("stable.example.com", "v1", &[orphan]).unwrap();

        assert_eq!(record.resources.len(), 1);
        assert_eq!(record.resources[0].resource, "bars");
        assert_eq!(record.resources[0].scope, Scope::Namespaced);
        assert!(record.resources[0].verbs.is_empty());
        assert_eq!(record.resources[0].subresources[0].subresource, "status");
        // No kind on the listing entry means no response kind
        assert_eq!(record.resources[0].subresources[0].response_kind, None);
    }

    #[test]
    fn test_malformed_subresource_names() {
        for name in ["/status", "foos/"] {
            let resource = LegacyResource {
                name: name.into(),
                ..Default::default()
            };
            assert_eq!(
                convert_legacy_listing("g", "v1", &[resource]),
                Err(LegacyConversionError::InvalidSubresource(name.into()))
            );
        }
    }
}
