//! Tunnel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::peer::CounterPolicy;

fn default_listen_port() -> u16 {
    51820
}

fn default_peer_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_peer_port() -> u16 {
    51821
}

fn default_session_id() -> u32 {
    12345
}

fn default_interface_name() -> String {
    "wgtun0".to_string()
}

fn default_mtu() -> u16 {
    1420
}

fn default_address_cidr() -> String {
    "192.168.233.1/24".to_string()
}

fn default_route_cidr() -> String {
    "192.168.233.0/24".to_string()
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(25)
}

fn default_recv_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Configuration for one tunnel endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Local UDP port the transport binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Remote peer address.
    #[serde(default = "default_peer_addr")]
    pub peer_addr: String,

    /// Remote peer port.
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,

    /// Session identifier carried in every frame.
    #[serde(default = "default_session_id")]
    pub session_id: u32,

    /// Name hint for the TUN interface (at most 15 characters).
    #[serde(default = "default_interface_name")]
    pub interface_name: String,

    /// MTU of the TUN interface.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Address/prefix assigned to the interface.
    #[serde(default = "default_address_cidr")]
    pub address_cidr: String,

    /// Network routed to the interface (intercepted traffic).
    #[serde(default = "default_route_cidr")]
    pub route_cidr: String,

    /// Send-idle interval after which a keepalive is emitted.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Upper bound on one transport receive, so the engine can service
    /// shutdown checks while the socket is quiet.
    #[serde(default = "default_recv_timeout", with = "humantime_serde")]
    pub recv_timeout: Duration,

    /// Reject frames whose counter does not advance the session's
    /// high-water mark. Off by default: counters are tracked, not
    /// enforced.
    #[serde(default)]
    pub strict_counters: bool,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            peer_addr: default_peer_addr(),
            peer_port: default_peer_port(),
            session_id: default_session_id(),
            interface_name: default_interface_name(),
            mtu: default_mtu(),
            address_cidr: default_address_cidr(),
            route_cidr: default_route_cidr(),
            keepalive_interval: default_keepalive_interval(),
            recv_timeout: default_recv_timeout(),
            strict_counters: false,
        }
    }
}

impl TunnelConfig {
    /// Counter policy implied by `strict_counters`.
    pub fn counter_policy(&self) -> CounterPolicy {
        if self.strict_counters {
            CounterPolicy::RejectReplay
        } else {
            CounterPolicy::AcceptAny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_deployment_constants() {
        let cfg = TunnelConfig::default();
        assert_eq!(cfg.listen_port, 51820);
        assert_eq!(cfg.session_id, 12345);
        assert_eq!(cfg.interface_name, "wgtun0");
        assert_eq!(cfg.address_cidr, "192.168.233.1/24");
        assert_eq!(cfg.route_cidr, "192.168.233.0/24");
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(25));
        assert!(!cfg.strict_counters);
        assert_eq!(cfg.counter_policy(), CounterPolicy::AcceptAny);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: TunnelConfig = toml::from_str("").expect("parse failed");
        assert_eq!(cfg.listen_port, 51820);
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(25));
        assert_eq!(cfg.recv_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_toml_round_trip_with_humantime_durations() {
        let cfg = TunnelConfig {
            keepalive_interval: Duration::from_secs(10),
            strict_counters: true,
            ..Default::default()
        };
        let raw = toml::to_string(&cfg).expect("serialize failed");
        let parsed: TunnelConfig = toml::from_str(&raw).expect("parse failed");
        assert_eq!(parsed.keepalive_interval, Duration::from_secs(10));
        assert_eq!(parsed.counter_policy(), CounterPolicy::RejectReplay);
    }
}
