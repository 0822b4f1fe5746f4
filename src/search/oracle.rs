use std::fmt;

use serde::Serialize;

use crate::http::{HeaderPair, ProbeResponse};

/// Marker reflected by the header bruteforce.
pub const BRUTEFORCE_CANARY: &str = "wcpcanary007";

/// Why an oracle decided a probe was affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    StatusCodeModified,
    ValueReflectedHeader,
    ValueReflectedBody,
    SetCookiePresent,
    MethodModified,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::StatusCodeModified => "Status code modified.",
            Reason::ValueReflectedHeader => "Value reflected in header.",
            Reason::ValueReflectedBody => "Value reflected in body.",
            Reason::SetCookiePresent => "Set-Cookie present.",
            Reason::MethodModified => "Method modified.",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub keep: bool,
    pub reasons: Vec<Reason>,
}

impl Decision {
    pub fn keep(reasons: Vec<Reason>) -> Self {
        Self { keep: true, reasons }
    }

    pub fn discard() -> Self {
        Self::default()
    }

    fn from_reasons(reasons: Vec<Reason>) -> Self {
        if reasons.is_empty() {
            Self::discard()
        } else {
            Self::keep(reasons)
        }
    }

    pub fn has_reason(&self, reason: Reason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// `(candidate pairs, baseline, probe response) -> Decision`. Pure.
pub type Oracle = fn(&[HeaderPair], &ProbeResponse, &ProbeResponse) -> Decision;

pub fn status_code_modified(
    _pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    if response.status != baseline.status {
        Decision::keep(vec![Reason::StatusCodeModified])
    } else {
        Decision::discard()
    }
}

pub fn status_code_redirect(
    _pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    if response.status != baseline.status && response.is_redirect() {
        Decision::keep(vec![Reason::StatusCodeModified])
    } else {
        Decision::discard()
    }
}

/// The response body collapsed, as it does for a `HEAD` answer.
pub fn small_body(
    _pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    if response.body.len() <= 2 && baseline.body.len() > 2 {
        Decision::keep(vec![Reason::MethodModified])
    } else {
        Decision::discard()
    }
}

/// A redirect whose `Location` carries the first candidate's value.
pub fn location_header(
    pairs: &[HeaderPair],
    _baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    let Some((_, value)) = pairs.first() else {
        return Decision::discard();
    };
    if !response.is_redirect() {
        return Decision::discard();
    }
    match response.header("location") {
        Some(location) if location.contains(value.as_str()) => {
            Decision::keep(vec![Reason::ValueReflectedHeader])
        }
        _ => Decision::discard(),
    }
}

pub fn host_override(
    pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    let Some((_, value)) = pairs.first() else {
        return Decision::discard();
    };
    let mut reasons = Vec::with_capacity(2);
    if response.status != baseline.status {
        reasons.push(Reason::StatusCodeModified);
    }
    if response.body_contains(value) {
        reasons.push(Reason::ValueReflectedBody);
    }
    Decision::from_reasons(reasons)
}

pub fn port_dos(
    pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    let mut reasons = location_header(pairs, baseline, response).reasons;
    reasons.extend(host_override(pairs, baseline, response).reasons);
    Decision::from_reasons(reasons)
}

pub fn bruteforce(
    pairs: &[HeaderPair],
    baseline: &ProbeResponse,
    response: &ProbeResponse,
) -> Decision {
    if pairs.is_empty() {
        return Decision::discard();
    }
    let mut reasons = Vec::with_capacity(2);
    if response.status != baseline.status {
        reasons.push(Reason::StatusCodeModified);
    }
    if response.body_contains(BRUTEFORCE_CANARY) {
        reasons.push(Reason::ValueReflectedBody);
    }
    Decision::from_reasons(reasons)
}
