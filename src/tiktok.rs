use std::sync::LazyLock;

use regex::Regex;

/// `tiktok.com` with optional scheme and `www.`/`vm.` subdomain, or
/// `m.tiktok.com` with a mandatory scheme.
static TIKTOK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?(?:vm\.)?tiktok\.com/\S+|https?://m\.tiktok\.com/\S+")
        .unwrap()
});

/// Find the first TikTok link in free-form message text.
pub fn find_url(text: &str) -> Option<&str> {
    TIKTOK_URL.find(text).map(|m| m.as_str())
}
