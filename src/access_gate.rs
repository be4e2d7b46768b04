//! Origin/referer admission check.

/// Origins the public deployment serves.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://bfer.land",
    "https://www.bfer.land",
    "https://peekperformer.github.io",
    "http://localhost",
    "http://127.0.0.1",
];

/// Prefix allow-list applied to the `Origin` and `Referer` request headers.
///
/// Matching is case-sensitive `starts_with`, so `http://localhost:5173` is
/// accepted by the `http://localhost` entry.
#[derive(Debug, Clone)]
pub struct AccessGate {
    allowed: Vec<String>,
}

impl AccessGate {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(Into::into)
                .filter(|origin: &String| !origin.is_empty())
                .collect(),
        }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed
    }

    /// Whether `value` starts with any allow-listed prefix. Empty values never match.
    pub fn matches(&self, value: &str) -> bool {
        !value.is_empty() && self.allowed.iter().any(|prefix| value.starts_with(prefix.as_str()))
    }

    /// Either header alone is enough to admit the request.
    pub fn is_allowed(&self, origin: &str, referer: &str) -> bool {
        self.matches(origin) || self.matches(referer)
    }

    /// Value for `Access-Control-Allow-Origin`: the caller's origin when it
    /// is allow-listed, otherwise the first configured origin.
    pub fn cors_origin<'a>(&'a self, origin: &'a str) -> &'a str {
        if self.matches(origin) {
            origin
        } else {
            self.allowed.first().map(String::as_str).unwrap_or("null")
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ORIGINS.iter().copied())
    }
}
