//! Interface provisioning seam.
//!
//! Assigning an address, bringing the interface up, and managing the
//! intercept route are host-configuration concerns, kept behind a trait so
//! the engine can run against an in-memory implementation in tests. The
//! daemon supplies an `ip(8)`-backed implementation on Linux.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Provisioning errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("{command} failed: {detail}")]
    Command { command: String, detail: String },

    #[error("invalid CIDR '{0}'")]
    InvalidCidr(String),
}

/// Host network configuration collaborator.
///
/// Invoked once when the tunnel starts (address, up, route) and once at
/// teardown (route removal, best-effort).
pub trait Provisioner: Send + Sync {
    /// Assign an address/prefix to the named interface. Idempotent.
    fn assign_address(&self, ifname: &str, cidr: &str) -> Result<(), ProvisionError>;

    /// Mark the interface administratively up.
    fn bring_up(&self, ifname: &str) -> Result<(), ProvisionError>;

    /// Route `network_cidr` to the named interface unless such a route
    /// already exists. A second invocation must not create a duplicate
    /// route or fail.
    fn ensure_route(&self, ifname: &str, network_cidr: &str) -> Result<(), ProvisionError>;

    /// Remove the route added by [`Provisioner::ensure_route`]. Callers
    /// treat failure as non-fatal.
    fn remove_route(&self, ifname: &str, network_cidr: &str) -> Result<(), ProvisionError>;
}

#[derive(Default)]
struct MemoryState {
    addresses: HashMap<String, String>,
    up: HashSet<String>,
    routes: HashSet<(String, String)>,
}

/// In-memory provisioner for tests and dry runs.
#[derive(Default)]
pub struct MemoryProvisioner {
    state: Mutex<MemoryState>,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address currently assigned to an interface.
    pub fn address_of(&self, ifname: &str) -> Option<String> {
        self.lock().addresses.get(ifname).cloned()
    }

    /// Whether the interface was brought up.
    pub fn is_up(&self, ifname: &str) -> bool {
        self.lock().up.contains(ifname)
    }

    /// All (interface, network) route entries currently present.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<_> = self.lock().routes.iter().cloned().collect();
        routes.sort();
        routes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Provisioner for MemoryProvisioner {
    fn assign_address(&self, ifname: &str, cidr: &str) -> Result<(), ProvisionError> {
        self.lock()
            .addresses
            .insert(ifname.to_string(), cidr.to_string());
        Ok(())
    }

    fn bring_up(&self, ifname: &str) -> Result<(), ProvisionError> {
        self.lock().up.insert(ifname.to_string());
        Ok(())
    }

    fn ensure_route(&self, ifname: &str, network_cidr: &str) -> Result<(), ProvisionError> {
        self.lock()
            .routes
            .insert((ifname.to_string(), network_cidr.to_string()));
        Ok(())
    }

    fn remove_route(&self, ifname: &str, network_cidr: &str) -> Result<(), ProvisionError> {
        self.lock()
            .routes
            .remove(&(ifname.to_string(), network_cidr.to_string()));
        Ok(())
    }
}
