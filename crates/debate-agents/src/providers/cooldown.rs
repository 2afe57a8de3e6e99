//! Minimum-interval gate for the local backend.
//!
//! Each caller reserves the next free slot while holding the lock, then
//! drops the lock and sleeps until its slot. Concurrent callers queue up one
//! interval apart without holding the lock while waiting.
//!
//! A gate built from a [`RoutingConfigHandle`] reads `local_cooldown_ms` on
//! every call, so a configuration reload takes effect for the next request.

use std::sync::Mutex;
use std::time::Duration;

use coordination::RoutingConfigHandle;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug)]
enum IntervalSource {
    Fixed(Duration),
    Routing(RoutingConfigHandle),
}

#[derive(Debug)]
pub struct CooldownGate {
    source: IntervalSource,
    next_slot: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self::with_source(IntervalSource::Fixed(interval))
    }

    /// Gate following the live routing configuration.
    pub fn from_routing(config: RoutingConfigHandle) -> Self {
        Self::with_source(IntervalSource::Routing(config))
    }

    fn with_source(source: IntervalSource) -> Self {
        Self {
            source,
            next_slot: Mutex::new(None),
        }
    }

    /// Current minimum interval between calls.
    pub fn interval(&self) -> Duration {
        match &self.source {
            IntervalSource::Fixed(interval) => *interval,
            IntervalSource::Routing(config) => match config.read(|c| c.local_cooldown_ms) {
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => {
                    warn!(error = %e, "Cooldown interval unavailable; not waiting");
                    Duration::ZERO
                }
            },
        }
    }

    /// Reserve a slot and return how long to wait for it.
    fn reserve(&self) -> Duration {
        let interval = self.interval();
        let now = Instant::now();
        let mut next = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if interval.is_zero() {
            *next = None;
            return Duration::ZERO;
        }
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + interval);
        slot - now
    }

    /// Wait for this caller's turn.
    pub async fn wait(&self) {
        let delay = self.reserve();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let gate = CooldownGate::new(Duration::from_millis(500));
        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_spaced_by_interval() {
        let gate = Arc::new(CooldownGate::new(Duration::from_millis(100)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.wait().await;
                Instant::now()
            }));
        }
        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();
        assert_eq!(
            finished,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_reload_changes_interval() {
        use coordination::RoutingConfig;

        let config = RoutingConfigHandle::new(RoutingConfig {
            local_cooldown_ms: 100,
            ..Default::default()
        });
        let gate = CooldownGate::from_routing(config.clone());
        assert_eq!(gate.interval(), Duration::from_millis(100));

        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));

        config
            .replace(RoutingConfig {
                local_cooldown_ms: 400,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(gate.interval(), Duration::from_millis(400));

        // The slot reserved under the old interval still binds once
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(600));

        config.replace(RoutingConfig::default()).unwrap();
        let before = Instant::now();
        gate.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_interval_is_noop() {
        let gate = CooldownGate::new(Duration::ZERO);
        gate.wait().await;
        gate.wait().await;
    }
}
