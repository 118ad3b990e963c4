//! Kubernetes-style version priority, used to keep the versions of a group in
//! a canonical order.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stability {
    Alpha,
    Beta,
    Ga,
}

#[derive(Debug, PartialEq, Eq)]
struct KubeVersion {
    major: u64,
    stability: Stability,
    minor: u64,
}

/// Parses `vN`, `vNbetaM` and `vNalphaM`. Anything else is not kube-like.
fn parse(version: &str) -> Option<KubeVersion> {
    let rest = version.strip_prefix('v')?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let major = rest[..digits_end].parse().ok()?;
    let rest = &rest[digits_end..];

    if rest.is_empty() {
        return Some(KubeVersion {
            major,
            stability: Stability::Ga,
            minor: 0,
        });
    }

    let (stability, minor) = if let Some(minor) = rest.strip_prefix("beta") {
        (Stability::Beta, minor)
    } else if let Some(minor) = rest.strip_prefix("alpha") {
        (Stability::Alpha, minor)
    } else {
        return None;
    };

    if minor.is_empty() || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(KubeVersion {
        major,
        stability,
        minor: minor.parse().ok()?,
    })
}

/// Orders versions by priority: `Less` means `a` is preferred over `b`.
///
/// GA versions come before beta, beta before alpha. Within a stability level
/// the higher major version wins, then the higher minor. Versions that do not
/// look like kube versions sort last, lexicographically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => pb
            .stability
            .cmp(&pa.stability)
            .then_with(|| pb.major.cmp(&pa.major))
            .then_with(|| pb.minor.cmp(&pa.minor))
            // `v1` and `v01` parse alike but are different versions
            .then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
