use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::sync::watch;
use wgtun_core::config::TunnelConfig;

#[cfg(target_os = "linux")]
pub async fn run_tunnel(cfg: TunnelConfig, stop: watch::Receiver<bool>) -> Result<()> {
    use std::sync::Arc;
    use wgtun_core::engine::{EngineConfig, TunnelEngine};
    use wgtun_core::transport::Transport;
    use wgtun_core::tun::LinuxTunDevice;

    use crate::ip_provision::IpCommandProvisioner;

    let peer: SocketAddr = format!("{}:{}", cfg.peer_addr, cfg.peer_port)
        .parse()
        .with_context(|| "peer_addr/peer_port is not a valid socket address")?;

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", cfg.listen_port)
        .parse()
        .with_context(|| "listen_port is not a valid port")?;

    tracing::info!(
        "tunnel config: bind={bind_addr} peer={peer} session={} interface={} keepalive={:?}",
        cfg.session_id,
        cfg.interface_name,
        cfg.keepalive_interval
    );

    let transport = Transport::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind UDP socket to {bind_addr}"))?;
    tracing::info!("UDP socket bound: {}", transport.local_addr()?);

    let tun = LinuxTunDevice::open(&cfg.interface_name, cfg.mtu)
        .context("failed to open TUN device (are you root?)")?;

    let engine = TunnelEngine::new(
        EngineConfig {
            peer,
            session_id: cfg.session_id,
            keepalive_interval: cfg.keepalive_interval,
            recv_timeout: cfg.recv_timeout,
            address_cidr: cfg.address_cidr.clone(),
            route_cidr: cfg.route_cidr.clone(),
            counter_policy: cfg.counter_policy(),
        },
        tun,
        transport,
        Arc::new(IpCommandProvisioner),
    );

    engine.run(stop).await.context("tunnel engine failed")
}

#[cfg(not(target_os = "linux"))]
pub async fn run_tunnel(_cfg: TunnelConfig, _stop: watch::Receiver<bool>) -> Result<()> {
    anyhow::bail!("the TUN device is currently only supported on Linux")
}
