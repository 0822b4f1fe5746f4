use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::http::random_lowercase;
use crate::models::Cookie;

/// Mutable per-subdomain state, only reachable through a [`BurstPermit`].
#[derive(Debug, Default)]
pub struct SubdomainState {
    pub last_requested: Option<Instant>,
    pub cookies: Vec<Cookie>,
}

impl SubdomainState {
    /// Add harvested cookies, skipping names already known. Non-session values get an
    /// 8-letter random suffix.
    pub fn merge_cookies(&mut self, harvested: impl IntoIterator<Item = Cookie>) {
        for mut cookie in harvested {
            if self.cookies.iter().any(|c| c.name == cookie.name) {
                continue;
            }
            if !cookie.is_session() {
                cookie.value.push_str(&random_lowercase(8));
            }
            self.cookies.push(cookie);
        }
    }
}

/// Exclusive access to one subdomain for the length of a request burst.
///
/// Dropping the permit stamps the last-request time and only then unlocks, so the next
/// holder always measures its backoff from the end of this burst.
pub struct BurstPermit {
    guard: OwnedMutexGuard<SubdomainState>,
}

impl BurstPermit {
    pub async fn acquire(state: &Arc<Mutex<SubdomainState>>, backoff: Duration) -> Self {
        let guard = Arc::clone(state).lock_owned().await;
        if let Some(last) = guard.last_requested {
            let elapsed = last.elapsed();
            if elapsed < backoff {
                tokio::time::sleep(backoff - elapsed).await;
            }
        }
        Self { guard }
    }

    pub fn mark_requested(&mut self) {
        self.guard.last_requested = Some(Instant::now());
    }
}

impl Deref for BurstPermit {
    type Target = SubdomainState;

    fn deref(&self) -> &SubdomainState {
        &self.guard
    }
}

impl DerefMut for BurstPermit {
    fn deref_mut(&mut self) -> &mut SubdomainState {
        &mut self.guard
    }
}

impl Drop for BurstPermit {
    fn drop(&mut self) {
        self.mark_requested();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_merge_cookies_dedups_by_name() {
        let mut state = SubdomainState::default();
        state.merge_cookies(vec![Cookie::new("sessionid", "abc")]);
        state.merge_cookies(vec![Cookie::new("sessionid", "other"), Cookie::new("theme", "dark")]);
        assert_eq!(state.cookies.len(), 2);
        assert_eq!(state.cookies[0].value, "abc");
    }

    #[test]
    fn test_merge_cookies_salts_non_session() {
        let mut state = SubdomainState::default();
        state.merge_cookies(vec![Cookie::new("theme", "dark"), Cookie::new("PHPSESSID", "s1")]);
        let theme = &state.cookies[0];
        assert!(theme.value.starts_with("dark"));
        assert_eq!(theme.value.len(), 4 + 8);
        assert!(theme.value[4..].chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(state.cookies[1].value, "s1");
    }

    #[tokio::test]
    async fn test_first_acquire_does_not_wait() {
        let state = Arc::new(Mutex::new(SubdomainState::default()));
        let start = Instant::now();
        let _permit = BurstPermit::acquire(&state, Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_drop_stamps_last_requested() {
        let state = Arc::new(Mutex::new(SubdomainState::default()));
        {
            let _permit = BurstPermit::acquire(&state, Duration::ZERO).await;
        }
        assert!(state.lock().await.last_requested.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_bursts_are_serialized_and_spaced() {
        let backoff = Duration::from_millis(60);
        let state = Arc::new(Mutex::new(SubdomainState::default()));
        let spans: Arc<StdMutex<Vec<(Instant, Instant)>>> = Arc::new(StdMutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                let spans = Arc::clone(&spans);
                tokio::spawn(async move {
                    let permit = BurstPermit::acquire(&state, backoff).await;
                    let start = Instant::now();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let end = Instant::now();
                    drop(permit);
                    spans.lock().unwrap().push((start, end));
                })
            })
            .collect();
        futures::future::join_all(handles).await;

        let mut spans = spans.lock().unwrap().clone();
        spans.sort_by_key(|(start, _)| *start);
        assert_eq!(spans.len(), 4);
        for pair in spans.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= prev_end, "bursts overlapped");
            assert!(next_start - prev_end >= backoff, "bursts closer than backoff");
        }
    }
}
