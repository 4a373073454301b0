//! Extraction of the interesting parts of a Playwright console log: the
//! first failure block, and screenshot URLs embedded by the suite.

use std::sync::OnceLock;

use regex::Regex;

/// Fixed fallback when a failed build's log has no recognizable failure
/// block.
pub const NO_ERROR_FOUND: &str = "No relevant error message found.";

/// Album prefix for failure screenshots in the evidence bucket.
pub const ERROR_ALBUM: &str = "Error";
/// Album prefix for success screenshots in the evidence bucket.
pub const SUCCESS_ALBUM: &str = "Success";

/// First Playwright failure block: the numbered `[chromium]` header through
/// the first stack frame with a `file.ext:LINE:COL` location.
fn failure_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)1\) \[chromium\].*?Error:[^\n]*\n\s+at.*?\.\w+:\d+:\d+")
            .expect("failure block pattern is valid")
    })
}

/// Pull a bounded excerpt out of a failed build's log: the first matching
/// failure block, trimmed, or [`NO_ERROR_FOUND`].
pub fn failure_excerpt(logs: &str) -> String {
    match failure_block_re().find(logs) {
        Some(m) => m.as_str().trim().to_string(),
        None => NO_ERROR_FOUND.to_string(),
    }
}

/// Find the first screenshot URL for `album` under the evidence bucket.
/// The suite prints these URLs into the console log after uploading.
pub fn screenshot_url(logs: &str, base_url: &str, album: &str) -> Option<String> {
    let pattern = format!(
        r"{}/{}/[^\s]+",
        regex::escape(base_url.trim_end_matches('/')),
        regex::escape(album)
    );
    let re = Regex::new(&pattern).ok()?;
    re.find(logs).map(|m| m.as_str().to_string())
}
