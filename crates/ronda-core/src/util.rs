//! Small text and clock helpers shared by config, remote adapters and the outbox.

/// Trimmed text, or `None` for missing and blank values.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

const MAX_REMOTE_MESSAGE_CHARS: usize = 180;

/// Remote error bodies are clipped before they reach logs and rejection reasons.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(MAX_REMOTE_MESSAGE_CHARS).collect()
}

pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_remote_tokens_are_dropped() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \t ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" station-7 ".to_string())),
            Some("station-7".to_string())
        );
    }

    #[test]
    fn remote_urls_need_http_scheme() {
        assert!(is_http_url("http://127.0.0.1:8080"));
        assert!(is_http_url("https://incidents.example.org"));
        assert!(!is_http_url("ftp://incidents.example.org"));
        assert!(!is_http_url("incidents.example.org"));
    }

    #[test]
    fn compact_text_clips_long_error_bodies() {
        let body = "e".repeat(500);
        assert_eq!(compact_text(&body).chars().count(), MAX_REMOTE_MESSAGE_CHARS);
        assert_eq!(compact_text("  code taken  "), "code taken");
    }
}
