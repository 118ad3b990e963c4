//! `Accept` header negotiation for the discovery document.

use crate::types::{DISCOVERY_GROUP, DISCOVERY_LIST_KIND, DISCOVERY_VERSION};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("none of the accepted media types can be served: {0}")]
    NotAcceptable(String),
}

/// Encodings the store can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    Yaml,
}

impl MediaType {
    pub const fn essence(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Yaml => "application/yaml",
        }
    }

    /// Full content type including the discovery profile parameters.
    pub fn content_type(&self) -> String {
        format!(
            "{};g={DISCOVERY_GROUP};v={DISCOVERY_VERSION};as={DISCOVERY_LIST_KIND}",
            self.essence()
        )
    }

    fn from_essence(essence: &str) -> Option<(Self, u8)> {
        match essence {
            "application/json" => Some((MediaType::Json, 2)),
            "application/yaml" => Some((MediaType::Yaml, 2)),
            "application/*" => Some((MediaType::Json, 1)),
            "*/*" => Some((MediaType::Json, 0)),
            _ => None,
        }
    }
}

struct Candidate {
    media_type: MediaType,
    quality: f32,
    specificity: u8,
}

/// Parses one media range. Returns `None` for ranges we cannot serve,
/// including ones whose profile parameters name a different document.
fn parse_range(range: &str) -> Option<Candidate> {
    let mut parts = range.split(';');
    let essence = parts.next()?.trim().to_ascii_lowercase();
    let (media_type, specificity) = MediaType::from_essence(&essence)?;

    let mut quality = 1.0;
    for param in parts {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        let expected = match key.trim().to_ascii_lowercase().as_str() {
            "q" => {
                quality = value.parse().ok()?;
                continue;
            }
            "g" => DISCOVERY_GROUP,
            "v" => DISCOVERY_VERSION,
            "as" => DISCOVERY_LIST_KIND,
            _ => continue,
        };
        if value != expected {
            return None;
        }
    }

    (quality > 0.0).then_some(Candidate {
        media_type,
        quality,
        specificity,
    })
}

/// Picks the encoding for a request.
///
/// The highest `q` wins, ties go to the most specific range and then to the
/// earliest one in the header. A missing or blank header selects JSON.
pub fn negotiate(accept: Option<&str>) -> Result<MediaType, NegotiationError> {
    let accept = match accept.map(str::trim) {
        None | Some("") => return Ok(MediaType::Json),
        Some(accept) => accept,
    };

    let mut best: Option<Candidate> = None;
    for candidate in accept.split(',').filter_map(parse_range) {
        let better = match &best {
            None => true,
            Some(current) => {
                candidate.quality > current.quality
                    || (candidate.quality == current.quality
                        && candidate.specificity > current.specificity)
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    best.map(|candidate| candidate.media_type)
        .ok_or_else(|| NegotiationError::NotAcceptable(accept.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = ";g=apidiscovery.k8s.io;v=v2beta1;as=APIGroupDiscoveryList";

    #[test]
    fn test_profiled_accept() {
        let json = format!("application/json{PROFILE}");
        let yaml = format!("application/yaml{PROFILE}");
        assert_eq!(negotiate(Some(&json)), Ok(MediaType::Json));
        assert_eq!(negotiate(Some(&yaml)), Ok(MediaType::Yaml));
        assert_eq!(
            MediaType::Json.content_type(),
            "application/json;g=apidiscovery.k8s.io;v=v2beta1;as=APIGroupDiscoveryList"
        );
    }

    #[test]
    fn test_missing_header_defaults_to_json() {
        assert_eq!(negotiate(None), Ok(MediaType::Json));
        assert_eq!(negotiate(Some("  ")), Ok(MediaType::Json));
        assert_eq!(negotiate(Some("*/*")), Ok(MediaType::Json));
        assert_eq!(negotiate(Some("application/*")), Ok(MediaType::Json));
    }

    #[test]
    fn test_wrong_profile_is_not_acceptable() {
        let legacy = "application/json;g=apidiscovery.k8s.io;v=v2beta1;as=APIGroupList";
        assert!(matches!(
            negotiate(Some(legacy)),
            Err(NegotiationError::NotAcceptable(_))
        ));

        let other_version = "application/json;g=apidiscovery.k8s.io;v=v1;as=APIGroupDiscoveryList";
        assert!(negotiate(Some(other_version)).is_err());

        assert!(negotiate(Some("application/vnd.kubernetes.protobuf")).is_err());
        assert!(negotiate(Some("text/html")).is_err());
    }

    #[test]
    fn test_fallback_to_later_range() {
        let accept = format!(
            "application/vnd.kubernetes.protobuf{PROFILE},application/yaml{PROFILE},application/json"
        );
        assert_eq!(negotiate(Some(&accept)), Ok(MediaType::Yaml));
    }

    #[test]
    fn test_quality_and_specificity() {
        assert_eq!(
            negotiate(Some("application/json;q=0.5, application/yaml")),
            Ok(MediaType::Yaml)
        );
        assert_eq!(
            negotiate(Some("*/*, application/yaml")),
            Ok(MediaType::Yaml)
        );
        assert_eq!(
            negotiate(Some("application/yaml, application/json")),
            Ok(MediaType::Yaml)
        );
        // q=0 means "not acceptable"
        assert!(negotiate(Some("application/json;q=0")).is_err());
        // Unparseable q drops the range
        assert!(negotiate(Some("application/json;q=abc")).is_err());
    }
}
