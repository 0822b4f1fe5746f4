use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::target::Target;

/// The attack that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackKind {
    ReflectedCookie,
    HostOverride,
    PathOverride,
    IllegalHeader,
    LargeHeaderCount,
    MethodOverride,
    ProtocolOverride,
    PortOverride,
    PermanentRedirect,
    PortDos,
    HeaderBruteforce,
}

impl AttackKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            AttackKind::ReflectedCookie => "Reflected Cookie",
            AttackKind::HostOverride => "Host Override",
            AttackKind::PathOverride => "Path Override",
            AttackKind::IllegalHeader => "Illegal Header",
            AttackKind::LargeHeaderCount => "Large Header Count",
            AttackKind::MethodOverride => "Method Override",
            AttackKind::ProtocolOverride => "Protocol Override",
            AttackKind::PortOverride => "Port Override",
            AttackKind::PermanentRedirect => "Permanent Redirect",
            AttackKind::PortDos => "Port DoS",
            AttackKind::HeaderBruteforce => "Header Bruteforce",
        }
    }
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for AttackKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Impact {
    #[serde(rename = "DoS")]
    Dos,
    #[serde(rename = "XSS")]
    Xss,
    #[serde(rename = "ATO")]
    Ato,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Dos => write!(f, "DoS"),
            Impact::Xss => write!(f, "XSS"),
            Impact::Ato => write!(f, "ATO"),
        }
    }
}

/// One confirmed finding.
#[derive(Debug, Clone, Serialize)]
pub struct Vuln {
    pub kind: AttackKind,
    pub details: String,
    pub offending_headers: Vec<String>,
    pub impact: Vec<Impact>,
    pub time_found: DateTime<Utc>,
}

impl Vuln {
    pub fn new(
        kind: AttackKind,
        details: impl Into<String>,
        offending_headers: Vec<String>,
        impact: Vec<Impact>,
    ) -> Self {
        Self {
            kind,
            details: details.into(),
            offending_headers,
            impact,
            time_found: Utc::now(),
        }
    }

    pub fn first_header(&self) -> Option<&str> {
        self.offending_headers.first().map(String::as_str)
    }
}

/// Everything found while attacking one target.
#[derive(Debug, Clone)]
pub struct AttackResult {
    pub target: Arc<Target>,
    pub vulns: Vec<Vuln>,
    pub time_started: DateTime<Utc>,
    pub time_stopped: DateTime<Utc>,
}

impl AttackResult {
    pub fn new(target: Arc<Target>) -> Self {
        let now = Utc::now();
        Self {
            target,
            vulns: Vec::new(),
            time_started: now,
            time_stopped: now,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.time_stopped - self.time_started
    }
}
