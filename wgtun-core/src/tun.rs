//! Virtual IP-layer interface (TUN) adapter.
//!
//! The adapter owns the virtual network device handle; each receive or
//! send transfers exactly one raw IP packet with no link-layer framing
//! and no extra packet-info header.
//!
//! Two implementations exist:
//! - [`linux::LinuxTunDevice`]: a real kernel TUN device (Linux only)
//! - [`ChannelTun`]: an in-memory adapter backed by channels, used by the
//!   engine tests and runnable without privileges

use std::future::Future;
use std::io;

use tokio::sync::{mpsc, Mutex};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::LinuxTunDevice;

/// Maximum interface name length (kernel IFNAMSIZ minus the terminator).
pub const MAX_NAME_LEN: usize = 15;

/// Virtual interface errors.
#[derive(Debug, thiserror::Error)]
pub enum TunError {
    #[error("TUN device node unavailable: {0}")]
    DeviceUnavailable(io::Error),

    #[error("insufficient privilege to open TUN device: {0}")]
    PermissionDenied(io::Error),

    #[error("kernel rejected interface creation: {0}")]
    Allocation(String),

    #[error("interface name '{0}' exceeds {MAX_NAME_LEN} characters")]
    InvalidName(String),

    #[error("interface I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Trait for TUN device implementations.
pub trait TunAdapter: Send + Sync + 'static {
    /// Receive one raw IP packet into `buf`; returns the packet length.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize, TunError>> + Send;

    /// Inject one raw IP packet into the host stack.
    fn send(&self, packet: &[u8]) -> impl Future<Output = Result<usize, TunError>> + Send;

    /// Name the kernel actually assigned to the interface.
    fn name(&self) -> &str;

    /// MTU of the interface.
    fn mtu(&self) -> usize;
}

/// Validate an interface name hint against the kernel length limit.
pub fn validate_name(name: &str) -> Result<(), TunError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(TunError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// In-memory TUN adapter backed by channels.
///
/// [`ChannelTunHandle`] plays the role of the host network stack: packets
/// injected through the handle appear on [`TunAdapter::recv`], and packets
/// the engine writes are delivered back to the handle.
pub struct ChannelTun {
    name: String,
    mtu: usize,
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// Test-side handle for a [`ChannelTun`].
pub struct ChannelTunHandle {
    inject: mpsc::Sender<Vec<u8>>,
    delivered: mpsc::Receiver<Vec<u8>>,
}

/// Create a connected in-memory TUN adapter and its handle.
pub fn channel_pair(name: &str, mtu: usize) -> Result<(ChannelTun, ChannelTunHandle), TunError> {
    validate_name(name)?;
    let (inject_tx, inject_rx) = mpsc::channel(64);
    let (deliver_tx, deliver_rx) = mpsc::channel(64);
    Ok((
        ChannelTun {
            name: name.to_string(),
            mtu,
            inbound: Mutex::new(inject_rx),
            outbound: deliver_tx,
        },
        ChannelTunHandle {
            inject: inject_tx,
            delivered: deliver_rx,
        },
    ))
}

impl TunAdapter for ChannelTun {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize, TunError> {
        let packet = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| TunError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "device closed")))?;
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    async fn send(&self, packet: &[u8]) -> Result<usize, TunError> {
        self.outbound
            .send(packet.to_vec())
            .await
            .map_err(|_| TunError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "device closed")))?;
        Ok(packet.len())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}

impl ChannelTunHandle {
    /// Feed one packet to the adapter, as if the host routed it there.
    pub async fn inject(&self, packet: Vec<u8>) -> Result<(), TunError> {
        self.inject
            .send(packet)
            .await
            .map_err(|_| TunError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "device closed")))
    }

    /// Next packet the adapter wrote back to the host stack.
    pub async fn delivered(&mut self) -> Option<Vec<u8>> {
        self.delivered.recv().await
    }
}
