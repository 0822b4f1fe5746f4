//! Scripted in-memory transport for tests.
//!
//! The responder plays the origin server. A caching mock sits a shared cache in front of it,
//! keyed on the full probe URL, so the first response for a `cachebuster` value is replayed for
//! every later probe with the same value.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;

use super::probe::{Probe, ProbeResponse};
use super::Transport;
use crate::errors::CachesnakeError;

type Responder = dyn Fn(&Probe) -> Result<ProbeResponse, CachesnakeError> + Send + Sync;

pub struct MockTransport {
    responder: Box<Responder>,
    caching: bool,
    cache: Mutex<HashMap<String, ProbeResponse>>,
    sent: Mutex<Vec<(Instant, Probe)>>,
}

impl MockTransport {
    /// Origin only: every probe reaches the responder.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Probe) -> Result<ProbeResponse, CachesnakeError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            caching: false,
            cache: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Origin behind a cache keyed on the probe URL.
    pub fn caching<F>(responder: F) -> Self
    where
        F: Fn(&Probe) -> Result<ProbeResponse, CachesnakeError> + Send + Sync + 'static,
    {
        Self {
            caching: true,
            ..Self::new(responder)
        }
    }

    /// Every probe received so far, in order.
    pub fn probes(&self) -> Vec<Probe> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Arrival time of every probe received so far.
    pub fn probe_times(&self) -> Vec<Instant> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, probe: &Probe) -> Result<ProbeResponse, CachesnakeError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Instant::now(), probe.clone()));

        if self.caching {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(&probe.url) {
                return Ok(hit.clone());
            }
        }

        let response = (self.responder)(probe)?;
        if self.caching {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(probe.url.clone(), response.clone());
        }
        Ok(response)
    }
}
