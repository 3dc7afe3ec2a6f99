//! Fingerprint defaults
//!
//! The user agent pool is only a default: operators can replace it through
//! the `[session]` config section. Entries are mobile WebView agents so the
//! resolved platform is `ios` or `android` for every default.

/// Default pool of user agents assigned to accounts on first use.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8 Build/UQ1A.240205.004; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.64 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B Build/TP1A.220624.014; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.64 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; M2101K6G Build/SKQ1.210908.001; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.64 Mobile Safari/537.36",
];

/// Ordered platform patterns. First case-insensitive substring match wins.
pub(crate) const PLATFORM_PATTERNS: &[(&str, crate::session::Platform)] = &[
    ("iphone", crate::session::Platform::Ios),
    ("android", crate::session::Platform::Android),
    ("ipad", crate::session::Platform::Ios),
];
