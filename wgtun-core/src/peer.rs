//! Peer session bookkeeping.
//!
//! One [`PeerSession`] exists per remote endpoint. The send counter is
//! shared between the engine's uplink path and the keepalive scheduler,
//! so it is atomic; the registry map is keyed by endpoint to allow more
//! than one configured peer even though the daemon currently wires up
//! exactly one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Policy applied to received counters.
///
/// The wire format carries a replay-relevant counter, but validating it is
/// an opt-in policy: the default records the highest value seen and
/// accepts everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPolicy {
    /// Accept any counter value; track the high-water mark only.
    AcceptAny,
    /// Reject frames whose counter is not strictly greater than the
    /// highest counter accepted so far.
    RejectReplay,
}

/// State for one tunnel session with a remote peer.
pub struct PeerSession {
    endpoint: SocketAddr,
    session_id: u32,
    tx_counter: AtomicU64,
    rx_highest_seen: AtomicU64,
    last_tx: Mutex<Instant>,
    last_rx: Mutex<Instant>,
}

impl PeerSession {
    fn new(endpoint: SocketAddr, session_id: u32) -> Self {
        let now = Instant::now();
        Self {
            endpoint,
            session_id,
            tx_counter: AtomicU64::new(0),
            rx_highest_seen: AtomicU64::new(0),
            last_tx: Mutex::new(now),
            last_rx: Mutex::new(now),
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Atomically claim the next send counter.
    ///
    /// Returns 1 for the first frame and increases by exactly 1 per call,
    /// with no gaps or repeats even under concurrent callers.
    pub fn next_tx_counter(&self) -> u64 {
        self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a received counter under the given policy.
    ///
    /// Returns `false` if the frame must be dropped as replayed.
    pub fn observe_rx(&self, counter: u64, policy: CounterPolicy) -> bool {
        match policy {
            CounterPolicy::AcceptAny => {
                self.rx_highest_seen.fetch_max(counter, Ordering::Relaxed);
                true
            }
            CounterPolicy::RejectReplay => {
                let mut current = self.rx_highest_seen.load(Ordering::Relaxed);
                loop {
                    if counter <= current {
                        return false;
                    }
                    match self.rx_highest_seen.compare_exchange_weak(
                        current,
                        counter,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return true,
                        Err(observed) => current = observed,
                    }
                }
            }
        }
    }

    /// Highest counter seen from the peer.
    pub fn rx_highest_seen(&self) -> u64 {
        self.rx_highest_seen.load(Ordering::Relaxed)
    }

    /// Record an outbound send on this session.
    pub fn mark_tx(&self) {
        *self.last_tx.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Record inbound traffic from the peer (liveness).
    pub fn mark_rx(&self) {
        *self.last_rx.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Instant of the most recent outbound send.
    pub fn last_tx_instant(&self) -> Instant {
        *self.last_tx.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time since the most recent outbound send.
    pub fn idle_tx(&self) -> Duration {
        self.last_tx_instant().elapsed()
    }

    /// Time since the most recent inbound frame.
    pub fn idle_rx(&self) -> Duration {
        self.last_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

/// Registry of peer sessions, keyed by remote endpoint.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<SocketAddr, Arc<PeerSession>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for the endpoint, or return the existing one.
    pub fn register(&self, endpoint: SocketAddr, session_id: u32) -> Arc<PeerSession> {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            peers
                .entry(endpoint)
                .or_insert_with(|| Arc::new(PeerSession::new(endpoint, session_id))),
        )
    }

    /// Look up the session for an endpoint.
    pub fn lookup(&self, endpoint: SocketAddr) -> Option<Arc<PeerSession>> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&endpoint)
            .cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn endpoint() -> SocketAddr {
        "127.0.0.1:51821".parse().unwrap()
    }

    #[test]
    fn test_tx_counter_starts_at_one_and_is_gapless() {
        let session = PeerSession::new(endpoint(), 12345);
        for expected in 1..=100u64 {
            assert_eq!(session.next_tx_counter(), expected);
        }
    }

    #[test]
    fn test_tx_counter_under_concurrent_callers() {
        let session = Arc::new(PeerSession::new(endpoint(), 12345));
        let threads = 8;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| session.next_tx_counter())
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().expect("thread panicked") {
                assert!(seen.insert(value), "counter {value} repeated");
            }
        }

        // Strictly increasing sequence starting at 1 with no gaps.
        let total = (threads * per_thread) as u64;
        assert_eq!(seen.len() as u64, total);
        assert_eq!(seen.iter().copied().min(), Some(1));
        assert_eq!(seen.iter().copied().max(), Some(total));
    }

    #[test]
    fn test_observe_rx_accept_any_tracks_highest() {
        let session = PeerSession::new(endpoint(), 12345);
        assert!(session.observe_rx(5, CounterPolicy::AcceptAny));
        assert!(session.observe_rx(3, CounterPolicy::AcceptAny));
        assert!(session.observe_rx(9, CounterPolicy::AcceptAny));
        assert_eq!(session.rx_highest_seen(), 9);
    }

    #[test]
    fn test_observe_rx_reject_replay() {
        let session = PeerSession::new(endpoint(), 12345);
        assert!(session.observe_rx(1, CounterPolicy::RejectReplay));
        assert!(session.observe_rx(2, CounterPolicy::RejectReplay));
        assert!(!session.observe_rx(2, CounterPolicy::RejectReplay));
        assert!(!session.observe_rx(1, CounterPolicy::RejectReplay));
        assert!(session.observe_rx(10, CounterPolicy::RejectReplay));
        assert_eq!(session.rx_highest_seen(), 10);
    }

    #[test]
    fn test_registry_register_is_idempotent() {
        let registry = PeerRegistry::new();
        let first = registry.register(endpoint(), 12345);
        let second = registry.register(endpoint(), 99999);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.session_id(), 12345);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_lookup_unknown_is_none() {
        let registry = PeerRegistry::new();
        registry.register(endpoint(), 12345);
        let other: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(registry.lookup(other).is_none());
        assert!(registry.lookup(endpoint()).is_some());
    }

    #[test]
    fn test_mark_tx_resets_idle_clock() {
        let session = PeerSession::new(endpoint(), 12345);
        thread::sleep(Duration::from_millis(10));
        assert!(session.idle_tx() >= Duration::from_millis(10));
        session.mark_tx();
        assert!(session.idle_tx() < Duration::from_millis(10));
    }
}
