//! Keepalive scheduler.
//!
//! Emits one empty keepalive frame per session whenever no outbound
//! traffic left the session for the configured interval (WireGuard's
//! default of 25 seconds). Driven purely by outbound idle time; inbound
//! traffic never triggers a keepalive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::peer::PeerSession;
use crate::proto::Frame;
use crate::transport::Transport;

/// Timer-driven keepalive emitter for one peer session.
pub struct KeepaliveScheduler {
    session: Arc<PeerSession>,
    transport: Arc<Transport>,
    interval: Duration,
}

impl KeepaliveScheduler {
    pub fn new(session: Arc<PeerSession>, transport: Arc<Transport>, interval: Duration) -> Self {
        Self {
            session,
            transport,
            interval,
        }
    }

    /// Run until the stop channel signals shutdown.
    ///
    /// Sleeps until the session has been send-idle for the full interval,
    /// then emits a single keepalive carrying the next tx counter. Data
    /// traffic resets the idle clock and thereby suppresses keepalives.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        loop {
            let deadline =
                tokio::time::Instant::from_std(self.session.last_tx_instant() + self.interval);
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if self.session.idle_tx() < self.interval {
                        // Data traffic moved the deadline; go back to sleep.
                        continue;
                    }
                    let frame =
                        Frame::keepalive(self.session.session_id(), self.session.next_tx_counter());
                    // Keep pacing even when a send fails; lost keepalives
                    // are not retried.
                    self.session.mark_tx();
                    match self
                        .transport
                        .send_to(&frame.encode(), self.session.endpoint())
                        .await
                    {
                        Ok(_) => tracing::debug!(
                            "sent keepalive to {} (counter {})",
                            self.session.endpoint(),
                            frame.header.counter
                        ),
                        Err(e) => tracing::warn!(
                            "keepalive send to {} failed: {e}",
                            self.session.endpoint()
                        ),
                    }
                }
            }
        }
    }
}
