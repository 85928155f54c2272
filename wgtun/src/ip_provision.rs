//! Linux interface provisioning via the `ip` command.

use std::net::Ipv4Addr;
use std::process::Command;

use wgtun_core::provision::{ProvisionError, Provisioner};

fn parse_cidr_v4(s: &str) -> Result<(Ipv4Addr, u8), ProvisionError> {
    let (ip_s, prefix_s) = s
        .split_once('/')
        .ok_or_else(|| ProvisionError::InvalidCidr(s.to_string()))?;

    let ip: Ipv4Addr = ip_s
        .parse()
        .map_err(|_| ProvisionError::InvalidCidr(s.to_string()))?;

    let prefix: u8 = prefix_s
        .parse()
        .map_err(|_| ProvisionError::InvalidCidr(s.to_string()))?;

    if prefix > 32 {
        return Err(ProvisionError::InvalidCidr(s.to_string()));
    }

    Ok((ip, prefix))
}

fn ip(args: &[&str]) -> Result<String, ProvisionError> {
    let rendered = format!("ip {}", args.join(" "));
    let out = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| ProvisionError::Command {
            command: rendered.clone(),
            detail: format!("failed to spawn: {e}"),
        })?;

    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();

    if !out.status.success() {
        return Err(ProvisionError::Command {
            command: rendered,
            detail: format!("{}: {}{}", out.status, stdout, stderr),
        });
    }

    Ok(stdout)
}

/// Provisions interfaces with `ip addr`, `ip link`, and `ip route`.
///
/// Requires root (or CAP_NET_ADMIN).
pub struct IpCommandProvisioner;

impl Provisioner for IpCommandProvisioner {
    fn assign_address(&self, ifname: &str, cidr: &str) -> Result<(), ProvisionError> {
        let (addr, prefix) = parse_cidr_v4(cidr)?;
        // `replace` instead of `add` keeps re-runs idempotent.
        ip(&["addr", "replace", &format!("{addr}/{prefix}"), "dev", ifname])?;
        tracing::info!("assigned {addr}/{prefix} to '{ifname}'");
        Ok(())
    }

    fn bring_up(&self, ifname: &str) -> Result<(), ProvisionError> {
        ip(&["link", "set", "dev", ifname, "up"])?;
        tracing::info!("interface '{ifname}' is up");
        Ok(())
    }

    fn ensure_route(&self, ifname: &str, cidr: &str) -> Result<(), ProvisionError> {
        let (dest, prefix) = parse_cidr_v4(cidr)?;
        let target = format!("{dest}/{prefix}");

        // Adding a route that already exists fails, so check first.
        let existing = ip(&["route", "show", &target])?;
        if !existing.trim().is_empty() {
            tracing::info!("route {target} already present, leaving it alone");
            return Ok(());
        }

        ip(&["route", "add", &target, "dev", ifname])?;
        tracing::info!("added route {target} via '{ifname}'");
        Ok(())
    }

    fn remove_route(&self, ifname: &str, cidr: &str) -> Result<(), ProvisionError> {
        let (dest, prefix) = parse_cidr_v4(cidr)?;
        ip(&["route", "del", &format!("{dest}/{prefix}"), "dev", ifname])?;
        tracing::info!("removed route {dest}/{prefix}");
        Ok(())
    }
}
