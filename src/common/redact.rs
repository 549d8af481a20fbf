//! Credential masking for logs, artifacts and API responses

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::config::Credentials;

/// Replacement text for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values are never echoed back
const SECRET_HEADERS: &[&str] = &["x-secret-key", "authorization", "x-signature"];

lazy_static! {
    static ref BEARER_REGEX: Regex = Regex::new(r"Bearer\s+[A-Za-z0-9\-_=.]+").unwrap();
}

/// Keep the first 8 characters of a key
pub fn mask_key(key: &str) -> String {
    if key.chars().count() > 8 {
        format!("{}...", key.chars().take(8).collect::<String>())
    } else {
        key.to_string()
    }
}

/// Keep the first `len` characters, marking the cut with `...`
pub fn preview(value: &str, len: usize) -> String {
    if value.chars().count() > len {
        format!("{}...", value.chars().take(len).collect::<String>())
    } else {
        value.to_string()
    }
}

/// Truncate on a character boundary
pub fn truncate_text(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Summarize headers for a test result
pub fn sanitize_headers<'a, I>(headers: I, preview_len: usize) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .map(|(name, value)| {
            let shown = if SECRET_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                REDACTED.to_string()
            } else {
                preview(value, preview_len)
            };
            (name.to_string(), shown)
        })
        .collect()
}

/// Scrubs known credential values out of free text
#[derive(Clone)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new(credentials: &Credentials) -> Self {
        let mut secrets: Vec<String> = [&credentials.api_key, &credentials.secret_key]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        // Longest first so a key containing another is replaced whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), REDACTED);
        }
        BEARER_REGEX
            .replace_all(&out, format!("Bearer {}", REDACTED).as_str())
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            api_key: "3890d422-882b-486d-9de6".to_string(),
            secret_key: "mf1x4y13dgnq".to_string(),
            issuer: "sandbox.example".to_string(),
        }
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("3890d422-882b"), "3890d422...");
        assert_eq!(mask_key("short"), "short");
        assert_eq!(mask_key("exactly8"), "exactly8");
    }

    #[test]
    fn test_preview_and_truncate_are_char_safe() {
        assert_eq!(preview("ééééé", 2), "éé...");
        assert_eq!(truncate_text("ünïcödé", 3), "ünï");
        assert_eq!(truncate_text("ab", 10), "ab");
    }

    #[test]
    fn test_sanitize_headers_hides_secrets() {
        let headers = vec![
            ("X-API-Key", "3890d422-882b-486d-9de6-c106d9951094"),
            ("X-Secret-Key", "mf1x4y13dgnq"),
            ("Authorization", "Bearer abc.def.ghi"),
            ("Content-Type", "application/json"),
        ];
        let sanitized = sanitize_headers(headers, 20);
        assert_eq!(sanitized["X-API-Key"], "3890d422-882b-486d-9...");
        assert_eq!(sanitized["X-Secret-Key"], REDACTED);
        assert_eq!(sanitized["Authorization"], REDACTED);
        assert_eq!(sanitized["Content-Type"], "application/json");
    }

    #[test]
    fn test_redactor_scrubs_credentials_and_tokens() {
        let redactor = Redactor::new(&creds());
        let msg = "failed with key 3890d422-882b-486d-9de6 and secret mf1x4y13dgnq, \
                   header Bearer eyJhbGciOi.eyJzdWIi.sig";
        let out = redactor.redact(msg);
        assert!(!out.contains("3890d422-882b"));
        assert!(!out.contains("mf1x4y13dgnq"));
        assert!(!out.contains("eyJhbGciOi"));
        assert!(out.contains("Bearer [REDACTED]"));
    }
}
