//! Linux TUN device implementation.
//!
//! Opens `/dev/net/tun` in IP-layer-only mode (no packet-info header) via
//! tun-rs. Requires the TUN/TAP kernel module and enough privilege to
//! create network interfaces (root or CAP_NET_ADMIN).

use std::io;
use std::sync::Arc;

use super::{validate_name, TunAdapter, TunError};

/// Platform path of the TUN control device node.
const TUN_DEVICE_NODE: &str = "/dev/net/tun";

/// A Linux kernel TUN device.
pub struct LinuxTunDevice {
    name: String,
    mtu: usize,
    device: Arc<tun_rs::AsyncDevice>,
}

impl LinuxTunDevice {
    /// Create a TUN interface named after `name_hint`.
    ///
    /// The kernel may assign a different name than the hint; the assigned
    /// name is available through [`TunAdapter::name`].
    ///
    /// # Errors
    ///
    /// - [`TunError::DeviceUnavailable`] if `/dev/net/tun` is missing
    /// - [`TunError::PermissionDenied`] without sufficient privilege
    /// - [`TunError::Allocation`] if the kernel rejects interface creation
    ///   (name collision, resource limits)
    pub fn open(name_hint: &str, mtu: u16) -> Result<Self, TunError> {
        validate_name(name_hint)?;
        probe_device_node()?;

        let device = tun_rs::DeviceBuilder::new()
            .name(name_hint)
            .mtu(mtu)
            .build_async()
            .map_err(|e| TunError::Allocation(e.to_string()))?;

        let name = device
            .name()
            .map_err(|e| TunError::Allocation(format!("failed to query assigned name: {e}")))?;

        tracing::info!("created TUN interface '{name}' with MTU {mtu}");

        Ok(Self {
            name,
            mtu: usize::from(mtu),
            device: Arc::new(device),
        })
    }
}

/// Classify access problems with the device node before asking the kernel
/// to allocate an interface.
fn probe_device_node() -> Result<(), TunError> {
    match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(TUN_DEVICE_NODE)
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TunError::DeviceUnavailable(e)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(TunError::PermissionDenied(e)),
        Err(e) => Err(TunError::DeviceUnavailable(e)),
    }
}

impl TunAdapter for LinuxTunDevice {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize, TunError> {
        Ok(self.device.recv(buf).await?)
    }

    async fn send(&self, packet: &[u8]) -> Result<usize, TunError> {
        Ok(self.device.send(packet).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}
