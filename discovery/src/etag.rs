use sha2::{Digest, Sha256};

/// Content hash of a canonical encoding. Unquoted.
pub fn compute(canonical: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical))
}

pub fn quote(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Splits an `If-None-Match` value into opaque tags. `None` if any entry is
/// malformed, in which case the header is ignored altogether.
fn parse_entity_tags(value: &str) -> Option<Vec<&str>> {
    value
        .split(',')
        .map(str::trim)
        .map(|tag| {
            if tag == "*" {
                return Some(tag);
            }
            let tag = tag.strip_prefix("W/").unwrap_or(tag);
            let opaque = tag.strip_prefix('"')?.strip_suffix('"')?;
            (!opaque.contains('"')).then_some(opaque)
        })
        .collect()
}

/// Whether the client's cached copy (per `If-None-Match`) is still current.
pub fn if_none_match_matches(header: Option<&str>, current: &str) -> bool {
    let Some(tags) = header.and_then(parse_entity_tags) else {
        return false;
    };
    tags.iter().any(|tag| *tag == "*" || *tag == current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_stable() {
        assert_eq!(compute(b"{}"), compute(b"{}"));
        assert_ne!(compute(b"{}"), compute(b"[]"));
        assert_eq!(compute(b"").len(), 64);
    }

    #[test]
    fn test_matching() {
        let current = compute(b"doc");
        let quoted = quote(&current);

        assert!(if_none_match_matches(Some(&quoted), &current));
        assert!(if_none_match_matches(Some(&format!("W/{quoted}")), &current));
        assert!(if_none_match_matches(
            Some(&format!("\"other\", {quoted}")),
            &current
        ));
        assert!(if_none_match_matches(Some("*"), &current));

        assert!(!if_none_match_matches(None, &current));
        assert!(!if_none_match_matches(Some("\"wrongetag\""), &current));
    }

    #[test]
    fn test_malformed_header_is_ignored() {
        let current = compute(b"doc");

        // Unquoted tags are not valid entity tags
        assert!(!if_none_match_matches(Some(&current), &current));
        assert!(!if_none_match_matches(
            Some(&format!("{}, garbage", quote(&current))),
            &current
        ));
        assert!(!if_none_match_matches(Some("\""), &current));
        assert!(!if_none_match_matches(Some(""), &current));
    }
}
