//! Tunnel engine.
//!
//! Wires the virtual interface, transport, peer registry, and keepalive
//! scheduler into two forwarding directions:
//!
//! - Uplink: one raw IP packet from the interface becomes one Data frame
//!   sent to the configured peer.
//! - Downlink: one datagram from the transport is decoded; Data payloads
//!   are written back to the interface, keepalives only refresh session
//!   liveness.
//!
//! Lifecycle: `Starting -> Provisioning -> Running -> ShuttingDown ->
//! Stopped`. A provisioning failure aborts straight to `Stopped`; once
//! running, a fatal interface or transport error (or the external stop
//! signal) triggers coordinated teardown including best-effort route
//! cleanup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::ip;
use crate::keepalive::KeepaliveScheduler;
use crate::peer::{CounterPolicy, PeerRegistry, PeerSession};
use crate::proto::{Frame, FrameType};
use crate::provision::{ProvisionError, Provisioner};
use crate::transport::{Transport, TransportError};
use crate::tun::{TunAdapter, TunError};

/// TUN read buffer size; comfortably above any configured MTU.
const TUN_RECV_BUF_SIZE: usize = 2000;

/// UDP receive buffer size (header + MTU-sized payload).
const UDP_RECV_BUF_SIZE: usize = 2048;

/// Engine configuration, resolved to concrete types.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote peer endpoint.
    pub peer: SocketAddr,
    /// Session identifier for the configured peer.
    pub session_id: u32,
    /// Send-idle interval for keepalives.
    pub keepalive_interval: Duration,
    /// Upper bound on one transport receive.
    pub recv_timeout: Duration,
    /// Address/prefix to assign to the interface.
    pub address_cidr: String,
    /// Network to route to the interface.
    pub route_cidr: String,
    /// Received-counter policy.
    pub counter_policy: CounterPolicy,
}

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Provisioning,
    Running,
    ShuttingDown,
    Stopped,
}

/// Fatal engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("virtual interface error: {0}")]
    Tun(#[from] TunError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// The tunnel engine.
pub struct TunnelEngine<T: TunAdapter> {
    config: EngineConfig,
    tun: Arc<T>,
    transport: Arc<Transport>,
    registry: Arc<PeerRegistry>,
    provisioner: Arc<dyn Provisioner>,
    state_tx: watch::Sender<EngineState>,
}

impl<T: TunAdapter> TunnelEngine<T> {
    pub fn new(
        config: EngineConfig,
        tun: T,
        transport: Transport,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Starting);
        Self {
            config,
            tun: Arc::new(tun),
            transport: Arc::new(transport),
            registry: Arc::new(PeerRegistry::new()),
            provisioner,
            state_tx,
        }
    }

    /// Observe engine state transitions.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// The engine's peer session registry.
    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    fn set_state(&self, state: EngineState) {
        tracing::info!("engine state: {state:?}");
        let _ = self.state_tx.send(state);
    }

    fn provision(&self, ifname: &str) -> Result<(), ProvisionError> {
        self.provisioner
            .assign_address(ifname, &self.config.address_cidr)?;
        self.provisioner.bring_up(ifname)?;
        self.provisioner
            .ensure_route(ifname, &self.config.route_cidr)?;
        tracing::info!(
            "provisioned '{ifname}': address {} route {}",
            self.config.address_cidr,
            self.config.route_cidr
        );
        Ok(())
    }

    /// Run the tunnel until a fatal error or the stop signal.
    ///
    /// A dropped stop sender counts as a stop request.
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> Result<(), EngineError> {
        let ifname = self.tun.name().to_string();

        self.set_state(EngineState::Provisioning);
        if let Err(e) = self.provision(&ifname) {
            self.set_state(EngineState::Stopped);
            return Err(e.into());
        }

        let session = self
            .registry
            .register(self.config.peer, self.config.session_id);
        self.set_state(EngineState::Running);

        let (halt_tx, halt_rx) = watch::channel(false);
        let mut workers: JoinSet<Result<(), EngineError>> = JoinSet::new();
        workers.spawn(uplink(
            Arc::clone(&self.tun),
            Arc::clone(&self.transport),
            Arc::clone(&session),
            halt_rx.clone(),
        ));
        workers.spawn(downlink(
            Arc::clone(&self.tun),
            Arc::clone(&self.transport),
            Arc::clone(&self.registry),
            self.config.counter_policy,
            self.config.recv_timeout,
            halt_rx.clone(),
        ));
        let scheduler = KeepaliveScheduler::new(
            session,
            Arc::clone(&self.transport),
            self.config.keepalive_interval,
        );
        workers.spawn(async move {
            scheduler.run(halt_rx).await;
            Ok(())
        });

        let fatal = loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        tracing::info!("stop requested");
                        break None;
                    }
                }
                joined = workers.join_next() => {
                    match joined {
                        Some(Ok(Ok(()))) | None => break None,
                        Some(Ok(Err(e))) => {
                            tracing::error!("fatal worker error: {e}");
                            break Some(e);
                        }
                        Some(Err(join_err)) => break Some(EngineError::Worker(join_err.to_string())),
                    }
                }
            }
        };

        self.set_state(EngineState::ShuttingDown);
        let _ = halt_tx.send(true);
        while workers.join_next().await.is_some() {}

        // The socket and the interface handle close when the engine drops;
        // the route outlives the process unless removed here.
        if let Err(e) = self
            .provisioner
            .remove_route(&ifname, &self.config.route_cidr)
        {
            tracing::warn!("route cleanup for {} failed: {e}", self.config.route_cidr);
        }

        self.set_state(EngineState::Stopped);
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Direction A: interface to network.
async fn uplink<T: TunAdapter>(
    tun: Arc<T>,
    transport: Arc<Transport>,
    session: Arc<PeerSession>,
    mut halt: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let mut buf = vec![0u8; TUN_RECV_BUF_SIZE];
    loop {
        tokio::select! {
            changed = halt.changed() => {
                if changed.is_err() || *halt.borrow() {
                    return Ok(());
                }
            }
            read = tun.recv(&mut buf) => {
                // A failing interface handle is fatal for the tunnel.
                let n = read?;
                if n == 0 {
                    continue;
                }

                match ip::summarize(&buf[..n]) {
                    Some(summary) => tracing::debug!("captured packet: {summary}"),
                    None => tracing::debug!("captured non-IPv4 packet: {n} bytes"),
                }

                let frame = Frame::new(
                    FrameType::Data,
                    session.session_id(),
                    session.next_tx_counter(),
                    buf[..n].to_vec(),
                );
                match transport.send_to(&frame.encode(), session.endpoint()).await {
                    Ok(sent) => {
                        session.mark_tx();
                        tracing::debug!(
                            "sent {sent} bytes to {} (counter {})",
                            session.endpoint(),
                            frame.header.counter
                        );
                    }
                    // Lost datagrams are not retried; the counter value is
                    // consumed either way.
                    Err(e) => tracing::warn!("send to {} failed: {e}", session.endpoint()),
                }
            }
        }
    }
}

/// Direction B: network to interface.
async fn downlink<T: TunAdapter>(
    tun: Arc<T>,
    transport: Arc<Transport>,
    registry: Arc<PeerRegistry>,
    policy: CounterPolicy,
    recv_timeout: Duration,
    mut halt: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    let mut buf = vec![0u8; UDP_RECV_BUF_SIZE];
    loop {
        tokio::select! {
            changed = halt.changed() => {
                if changed.is_err() || *halt.borrow() {
                    return Ok(());
                }
            }
            received = transport.recv_from(&mut buf, Some(recv_timeout)) => {
                let Some((n, from)) = received? else {
                    continue; // receive timeout, check for shutdown
                };

                let Some(session) = registry.lookup(from) else {
                    tracing::debug!("dropping {n} bytes from unknown sender {from}");
                    continue;
                };

                let frame = match Frame::decode(&buf[..n]) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("malformed frame from {from}: {e}");
                        continue;
                    }
                };

                if !session.observe_rx(frame.header.counter, policy) {
                    tracing::warn!(
                        "replayed counter {} from {from}, dropping",
                        frame.header.counter
                    );
                    continue;
                }
                session.mark_rx();

                match frame.header.frame_type {
                    FrameType::Keepalive => {
                        tracing::debug!("keepalive from {from} (counter {})", frame.header.counter);
                    }
                    FrameType::Data => {
                        if frame.payload.is_empty() {
                            continue;
                        }
                        // A failing interface handle is fatal.
                        tun.send(&frame.payload).await?;
                        tracing::debug!("delivered {} bytes from {from}", frame.payload.len());
                    }
                    other => {
                        tracing::debug!("ignoring {other} frame from {from}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::provision::MemoryProvisioner;
    use crate::tun::channel_pair;

    struct FailingProvisioner;

    impl Provisioner for FailingProvisioner {
        fn assign_address(&self, _: &str, _: &str) -> Result<(), ProvisionError> {
            Ok(())
        }

        fn bring_up(&self, _: &str) -> Result<(), ProvisionError> {
            Ok(())
        }

        fn ensure_route(&self, _: &str, cidr: &str) -> Result<(), ProvisionError> {
            Err(ProvisionError::Command {
                command: format!("ip route add {cidr}"),
                detail: "operation not permitted".to_string(),
            })
        }

        fn remove_route(&self, _: &str, _: &str) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    fn test_config(peer: SocketAddr) -> EngineConfig {
        EngineConfig {
            peer,
            session_id: 12345,
            keepalive_interval: Duration::from_secs(25),
            recv_timeout: Duration::from_millis(50),
            address_cidr: "192.168.233.1/24".to_string(),
            route_cidr: "192.168.233.0/24".to_string(),
            counter_policy: CounterPolicy::AcceptAny,
        }
    }

    #[tokio::test]
    async fn test_provisioning_failure_aborts_to_stopped() {
        let (tun, _handle) = channel_pair("wgtun0", 1420).expect("pair failed");
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed");

        let engine = TunnelEngine::new(
            test_config("127.0.0.1:51821".parse().unwrap()),
            tun,
            transport,
            Arc::new(FailingProvisioner),
        );
        let mut state = engine.state();

        let (_stop_tx, stop_rx) = watch::channel(false);
        let result = engine.run(stop_rx).await;
        assert!(matches!(result, Err(EngineError::Provision(_))));
        assert_eq!(*state.borrow_and_update(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_signal_leads_to_clean_shutdown_and_route_cleanup() {
        let (tun, _handle) = channel_pair("wgtun0", 1420).expect("pair failed");
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed");
        let provisioner = Arc::new(MemoryProvisioner::new());

        let engine = TunnelEngine::new(
            test_config("127.0.0.1:51821".parse().unwrap()),
            tun,
            transport,
            Arc::clone(&provisioner) as Arc<dyn Provisioner>,
        );
        let mut state = engine.state();

        let (stop_tx, stop_rx) = watch::channel(false);
        let run = tokio::spawn(engine.run(stop_rx));

        // Wait for Running, then stop.
        loop {
            state.changed().await.expect("engine dropped");
            if *state.borrow() == EngineState::Running {
                break;
            }
        }
        assert!(provisioner.is_up("wgtun0"));
        assert_eq!(provisioner.routes().len(), 1);

        stop_tx.send(true).expect("stop send failed");
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("engine did not stop")
            .expect("engine panicked");
        assert!(result.is_ok());
        assert_eq!(*state.borrow_and_update(), EngineState::Stopped);
        assert!(provisioner.routes().is_empty(), "route was not cleaned up");
    }

    #[tokio::test]
    async fn test_closed_interface_is_fatal() {
        let (tun, handle) = channel_pair("wgtun0", 1420).expect("pair failed");
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed");

        let engine = TunnelEngine::new(
            test_config("127.0.0.1:51821".parse().unwrap()),
            tun,
            transport,
            Arc::new(MemoryProvisioner::new()),
        );

        let (_stop_tx, stop_rx) = watch::channel(false);
        let run = tokio::spawn(engine.run(stop_rx));

        // Closing the host side makes the uplink read fail.
        drop(handle);

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("engine did not stop")
            .expect("engine panicked");
        assert!(matches!(result, Err(EngineError::Tun(_))));
    }
}
