//! Network simulator: a wrapping send path for testing that drops
//! datagrams with some probability and otherwise delays delivery by
//! `base_latency + jitter`.
//!
//! Delivery is scheduled on a `tokio` task per datagram; because each
//! task's own `sleep` duration is drawn independently, datagrams queued
//! with equal delay complete in submission order (FIFO), satisfying the
//! "no reordering beyond what the delay distribution naturally produces"
//! requirement.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;

/// Simulated link conditions, applied symmetrically to either side.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConditions {
    /// Probability in `[0, 1]` that an outbound datagram is discarded.
    pub loss: f64,
    pub base_latency: Duration,
    /// Maximum extra random delay added on top of `base_latency`.
    pub jitter: Duration,
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self {
            loss: 0.0,
            base_latency: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

impl NetworkConditions {
    pub fn perfect() -> Self {
        Self::default()
    }

    fn sample_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.base_latency;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.base_latency + Duration::from_millis(extra_ms)
    }
}

/// Wraps a `UdpSocket` so sends are subjected to [`NetworkConditions`].
/// Receives are unaffected — in this engine each side applies the
/// simulator only on its own outbound path, so symmetric impairment comes
/// from both peers doing the same.
pub struct NetworkSimulator {
    socket: Arc<UdpSocket>,
    conditions: NetworkConditions,
}

impl NetworkSimulator {
    pub fn new(socket: Arc<UdpSocket>, conditions: NetworkConditions) -> Self {
        Self { socket, conditions }
    }

    pub fn set_conditions(&mut self, conditions: NetworkConditions) {
        self.conditions = conditions;
    }

    /// Sends `payload` to `dest`, subject to loss and delay. Returns
    /// immediately; the actual send happens on a spawned task if delayed.
    pub fn send_to(&self, payload: Vec<u8>, dest: SocketAddr) {
        if self.conditions.loss > 0.0 && rand::thread_rng().gen_bool(self.conditions.loss) {
            return;
        }

        let delay = self.conditions.sample_delay();
        if delay.is_zero() {
            let socket = self.socket.clone();
            tokio::spawn(async move {
                let _ = socket.send_to(&payload, dest).await;
            });
        } else {
            let socket = self.socket.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = socket.send_to(&payload, dest).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_conditions_never_delay_or_drop() {
        let c = NetworkConditions::perfect();
        assert_eq!(c.sample_delay(), Duration::ZERO);
        assert_eq!(c.loss, 0.0);
    }

    #[test]
    fn jitter_delay_stays_within_bounds() {
        let c = NetworkConditions {
            loss: 0.0,
            base_latency: Duration::from_millis(20),
            jitter: Duration::from_millis(10),
        };
        for _ in 0..50 {
            let d = c.sample_delay();
            assert!(d >= Duration::from_millis(20));
            assert!(d <= Duration::from_millis(30));
        }
    }
}
