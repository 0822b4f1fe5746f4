use serde::Serialize;

use crate::models::Cookie;

/// Header name and value.
pub type HeaderPair = (String, String);

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub method: String,
    /// Absolute URL, cache-buster already applied.
    pub url: String,
    /// Sent in order. Duplicates are allowed.
    pub headers: Vec<HeaderPair>,
    pub cookies: Vec<Cookie>,
    /// Let the HTTP client canonicalise header names. When off, names go out verbatim.
    pub normalize_headers: bool,
    /// Let the HTTP client manage `Host` and `User-Agent`.
    pub special_headers: bool,
}

impl Probe {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            normalize_headers: true,
            special_headers: true,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Replace every header called `name` with a single one, or append it.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(idx) => {
                self.headers[idx] = (name.clone(), value);
                let mut seen = 0;
                self.headers.retain(|(k, _)| {
                    if !k.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.headers.push((name, value)),
        }
    }

    /// Append a header, keeping any existing ones with the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Value for a `Cookie` header, if the probe carries cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A received response. Header lookup is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: Vec<HeaderPair>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl ProbeResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn is_redirect(&self) -> bool {
        (301..=308).contains(&self.status)
    }

    pub fn body_contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        if needle.is_empty() {
            return false;
        }
        self.body.windows(needle.len()).any(|w| w == needle)
    }
}
