//! Core library for the wgtun tunnel endpoint.
//!
//! This library implements a minimal WireGuard-style tunnel: raw IP packets
//! captured from a TUN virtual interface are wrapped in a fixed 16-byte
//! framing header and relayed over UDP to a single configured peer, with
//! periodic keepalives holding NAT bindings open.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - `proto`: Wire framing, the 16-byte header format, and frame types
//! - `tun`: Virtual Layer-3 interface abstraction and the Linux TUN device
//! - `transport`: The UDP socket wrapper with bounded receives
//! - `peer`: Per-peer session state, transmit counters, and the registry
//! - `provision`: Interface address/route provisioning
//! - `keepalive`: Send-idle keepalive scheduling
//! - `engine`: The bidirectional forwarding engine and its lifecycle
//! - `config`: Tunnel configuration with serde defaults
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # async fn example() -> Result<(), wgtun_core::engine::EngineError> {
//! use wgtun_core::engine::{EngineConfig, TunnelEngine};
//! use wgtun_core::peer::CounterPolicy;
//! use wgtun_core::provision::MemoryProvisioner;
//! use wgtun_core::transport::Transport;
//! use wgtun_core::tun::channel_pair;
//!
//! let (tun, _handle) = channel_pair("wgtun0", 1420)?;
//! let transport = Transport::bind("0.0.0.0:51820".parse().unwrap()).await?;
//! let engine = TunnelEngine::new(
//!     EngineConfig {
//!         peer: "203.0.113.7:51820".parse().unwrap(),
//!         session_id: 12345,
//!         keepalive_interval: Duration::from_secs(25),
//!         recv_timeout: Duration::from_secs(1),
//!         address_cidr: "192.168.233.1/24".to_string(),
//!         route_cidr: "192.168.233.0/24".to_string(),
//!         counter_policy: CounterPolicy::AcceptAny,
//!     },
//!     tun,
//!     transport,
//!     Arc::new(MemoryProvisioner::new()),
//! );
//! let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! engine.run(stop_rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod ip;
pub mod keepalive;
pub mod peer;
pub mod proto;
pub mod provision;
pub mod transport;
pub mod tun;

pub use proto::{Frame, FrameHeader, FrameType};
