//! Identity capture and the base64url reason-string tag that carries it on-chain.

use crate::types::IdentityAttribution;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct IdentityInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub provider: Option<String>,
    pub subject: Option<String>,
}

fn normalize_trim(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !local.contains(char::is_whitespace)
                && domain.contains('.')
                && !domain.contains(char::is_whitespace)
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Normalizes raw input and picks the highest-precedence identity method:
/// oauth > email > manual > none.
pub fn capture_identity(input: IdentityInput) -> Option<IdentityAttribution> {
    let name = input.name.as_deref().and_then(normalize_trim);
    let email = input
        .email
        .as_deref()
        .and_then(normalize_trim)
        .map(|e| e.to_lowercase());
    let provider = input.provider.as_deref().and_then(normalize_trim);
    let subject = input.subject.as_deref().and_then(normalize_trim);

    if let Some(email) = &email {
        if !looks_like_email(email) {
            return None;
        }
    }

    match (provider, subject) {
        (Some(provider), Some(subject)) => Some(IdentityAttribution::Oauth {
            name,
            email,
            provider,
            subject,
        }),
        (None, None) => {
            if let Some(email) = email {
                Some(IdentityAttribution::Email { name, email })
            } else if let Some(name) = name {
                Some(IdentityAttribution::Manual { name })
            } else {
                Some(IdentityAttribution::None)
            }
        }
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TagPayload {
    v: u8,
    #[serde(flatten)]
    identity: IdentityAttribution,
}

/// Appends `[identity:...]` to `reason_text` when `identity` is not `None`.
pub fn append_identity_to_reason(reason_text: &str, identity: &IdentityAttribution) -> String {
    if matches!(identity, IdentityAttribution::None) {
        return reason_text.to_string();
    }
    let payload = TagPayload {
        v: 1,
        identity: identity.clone(),
    };
    let json = serde_json::to_vec(&payload).expect("identity tag always serializes");
    let encoded = URL_SAFE_NO_PAD.encode(json);
    format!("{reason_text} [identity:{encoded}]")
}

/// Strips and decodes the trailing `[identity:...]` tag, if any.
///
/// Malformed or forged tags never raise: the raw reason is returned unmodified
/// and `identity` comes back `None`.
pub fn parse_attributed_reason(raw_reason: &str) -> (String, Option<IdentityAttribution>) {
    let trimmed = raw_reason.trim_end();
    let Some(open) = trimmed.rfind("[identity:") else {
        return (raw_reason.to_string(), None);
    };
    if !trimmed.ends_with(']') {
        return (raw_reason.to_string(), None);
    }
    let encoded = &trimmed[open + "[identity:".len()..trimmed.len() - 1];
    if encoded.is_empty()
        || !encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return (raw_reason.to_string(), None);
    }

    let base = trimmed[..open].trim_end().to_string();
    let Ok(decoded) = URL_SAFE_NO_PAD.decode(encoded) else {
        return (raw_reason.to_string(), None);
    };
    let Ok(payload) = serde_json::from_slice::<TagPayload>(&decoded) else {
        return (raw_reason.to_string(), None);
    };
    if payload.v != 1 {
        return (raw_reason.to_string(), None);
    }
    (base, Some(payload.identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_reason_and_identity() {
        let identity = IdentityAttribution::Email {
            name: Some("Ada Lovelace".to_string()),
            email: "ada@example.com".to_string(),
        };
        let tagged = append_identity_to_reason("monthly retirement", &identity);
        let (reason, parsed) = parse_attributed_reason(&tagged);
        assert_eq!(reason, "monthly retirement");
        assert_eq!(parsed, Some(identity));
    }

    #[test]
    fn forged_tag_never_panics_and_yields_raw_reason() {
        let forged = "retirement [identity:not-valid-base64!!]";
        let (reason, identity) = parse_attributed_reason(forged);
        assert_eq!(reason, forged);
        assert!(identity.is_none());
    }

    #[test]
    fn html_metacharacters_survive_round_trip_byte_for_byte() {
        let identity = IdentityAttribution::Manual {
            name: "<script>alert('x')</script>".to_string(),
        };
        let tagged = append_identity_to_reason("r", &identity);
        let (_, parsed) = parse_attributed_reason(&tagged);
        assert_eq!(parsed, Some(identity));
    }

    #[test]
    fn oauth_takes_precedence_over_email_and_manual() {
        let identity = capture_identity(IdentityInput {
            name: Some("A".to_string()),
            email: Some("a@b.com".to_string()),
            provider: Some("google".to_string()),
            subject: Some("sub-1".to_string()),
        });
        assert!(matches!(identity, Some(IdentityAttribution::Oauth { .. })));
    }

    #[test]
    fn invalid_email_rejected() {
        let identity = capture_identity(IdentityInput {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        });
        assert!(identity.is_none());
    }

    #[test]
    fn no_input_yields_none_method() {
        let identity = capture_identity(IdentityInput::default());
        assert_eq!(identity, Some(IdentityAttribution::None));
    }
}
