//! The shared User-Agent header used by both the API Client and the
//! Downloader. The server rejects a default-library agent with 401, so a
//! browser-style string is required rather than one identifying this tool.

/// Returns the browser-style User-Agent sent with every request.
#[must_use]
pub fn browser_user_agent() -> &'static str {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_like_a_browser_not_a_library_default() {
        let ua = browser_user_agent();
        assert!(ua.contains("Mozilla"));
        assert!(!ua.to_lowercase().contains("reqwest"));
    }
}
