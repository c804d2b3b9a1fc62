//! Per-client rate limiting.
//!
//! Every peer IP gets its own [`TokenBucket`], created on first contact and
//! dropped by a background sweeper once the peer has been quiet for
//! [`CLIENT_IDLE_TIMEOUT`]. A single mutex guards the whole map, so
//! decisions for one client are serialized.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::rate_limit_config::{LimiterSettings, CLIENT_IDLE_TIMEOUT, SWEEP_INTERVAL};
use crate::token_bucket::TokenBucket;

#[derive(Debug)]
struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct ClientRegistry {
    settings: LimiterSettings,
    idle_timeout: Duration,
    clients: Mutex<HashMap<IpAddr, Client>>,
}

impl ClientRegistry {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            settings,
            idle_timeout: CLIENT_IDLE_TIMEOUT,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Decides whether `ip` may make another request right now.
    pub fn allow(&self, ip: IpAddr) -> bool {
        if !self.settings.enabled {
            return true;
        }

        let now = Instant::now();
        let mut clients = self.lock();

        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: TokenBucket::new(self.settings.burst, self.settings.requests_per_second, now),
            last_seen: now,
        });

        client.last_seen = now;
        client.bucket.try_consume(now)
    }

    /// Removes every client idle for longer than the idle timeout and
    /// returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();

        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= self.idle_timeout);
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.lock().contains_key(ip)
    }

    /// Starts the idle-client sweeper. It runs for the life of the runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = registry.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = registry.len(), "Evicted idle rate limit clients");
                }
            }
        })
    }

    // A poisoned lock only means another request panicked mid-decision;
    // bucket state is still within bounds, so keep serving.
    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_deny() {
        let registry = ClientRegistry::new(LimiterSettings::new(2.0, 4));
        for _ in 0..4 {
            assert!(registry.allow(ip(1)));
        }
        assert!(!registry.allow(ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let registry = ClientRegistry::new(LimiterSettings::new(1.0, 1));
        assert!(registry.allow(ip(1)));
        assert!(!registry.allow(ip(1)));
        assert!(registry.allow(ip(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_below_rps_never_denied() {
        let registry = ClientRegistry::new(LimiterSettings::new(2.0, 4));
        for _ in 0..50 {
            assert!(registry.allow(ip(1)));
            time::advance(Duration::from_millis(600)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_refill_over_time() {
        let registry = ClientRegistry::new(LimiterSettings::new(2.0, 2));
        assert!(registry.allow(ip(1)));
        assert!(registry.allow(ip(1)));
        assert!(!registry.allow(ip(1)));

        time::advance(Duration::from_millis(500)).await;
        assert!(registry.allow(ip(1)));
        assert!(!registry.allow(ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_always_allows_and_tracks_nothing() {
        let registry = ClientRegistry::new(LimiterSettings::disabled());
        for _ in 0..100 {
            assert!(registry.allow(ip(1)));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_requests_still_refresh_last_seen() {
        let registry = ClientRegistry::new(LimiterSettings::new(0.001, 1));
        assert!(registry.allow(ip(1)));

        time::advance(Duration::from_secs(120)).await;
        assert!(!registry.allow(ip(1)));

        time::advance(Duration::from_secs(120)).await;
        assert_eq!(registry.sweep(), 0);
        assert!(registry.contains(&ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_client_evicted_and_starts_fresh() {
        let registry = ClientRegistry::new(LimiterSettings::new(0.001, 2));
        assert!(registry.allow(ip(1)));
        assert!(registry.allow(ip(1)));
        assert!(!registry.allow(ip(1)));

        time::advance(Duration::from_secs(181)).await;
        assert_eq!(registry.sweep(), 1);
        assert!(!registry.contains(&ip(1)));

        assert!(registry.allow(ip(1)));
        assert!(registry.allow(ip(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_evicts_idle_clients() {
        let registry = Arc::new(ClientRegistry::new(LimiterSettings::new(2.0, 4)));
        registry.allow(ip(1));
        let handle = registry.spawn_sweeper();

        time::sleep(Duration::from_secs(4 * 60 + 1)).await;
        assert!(registry.is_empty());
        handle.abort();
    }
}
