//! Reachability gate in front of every transmission.
//!
//! The routing layer is a collaborator: it knows whether the node currently
//! has a route into the mesh and which node is the root (the collector).
//! Sending is only permitted when both are true.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// The interface the agent needs from the mesh routing layer.
pub trait RoutingLayer: Send + Sync {
    /// Whether the node currently has network connectivity.
    fn is_reachable(&self) -> bool;

    /// Address of the mesh root, if the routing layer knows one.
    fn root_address(&self) -> Option<IpAddr>;
}

/// Result of a reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable(IpAddr),
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable(_))
    }
}

/// Decides, each cycle, whether sending is permitted.
///
/// Every call queries the routing layer afresh; nothing is cached.
#[derive(Debug)]
pub struct ReachabilityGate<R> {
    routing: R,
}

impl<R: RoutingLayer> ReachabilityGate<R> {
    pub fn new(routing: R) -> Self {
        Self { routing }
    }

    pub fn check(&self) -> Reachability {
        if !self.routing.is_reachable() {
            return Reachability::Unreachable;
        }
        match self.routing.root_address() {
            Some(root) => Reachability::Reachable(root),
            None => Reachability::Unreachable,
        }
    }

    pub fn routing(&self) -> &R {
        &self.routing
    }
}

/// Routing layer backed by a configured root address.
///
/// Used when the agent runs on a host without a mesh stack, and in tests.
/// Reachability can be toggled at runtime.
#[derive(Debug)]
pub struct StaticRouting {
    root: RwLock<Option<IpAddr>>,
    reachable: AtomicBool,
}

impl StaticRouting {
    pub fn new(root: Option<IpAddr>) -> Self {
        Self {
            root: RwLock::new(root),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    pub fn set_root(&self, root: Option<IpAddr>) {
        if let Ok(mut current) = self.root.write() {
            *current = root;
        }
    }
}

impl RoutingLayer for StaticRouting {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    fn root_address(&self) -> Option<IpAddr> {
        self.root.read().ok().and_then(|root| *root)
    }
}

impl<R: RoutingLayer + ?Sized> RoutingLayer for std::sync::Arc<R> {
    fn is_reachable(&self) -> bool {
        (**self).is_reachable()
    }

    fn root_address(&self) -> Option<IpAddr> {
        (**self).root_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use std::sync::Arc;

    fn root() -> IpAddr {
        IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1))
    }

    #[test]
    fn test_reachable_with_root() {
        let gate = ReachabilityGate::new(StaticRouting::new(Some(root())));
        assert_eq!(gate.check(), Reachability::Reachable(root()));
        assert!(gate.check().is_reachable());
    }

    #[test]
    fn test_unreachable_without_connectivity() {
        let routing = StaticRouting::new(Some(root()));
        routing.set_reachable(false);
        let gate = ReachabilityGate::new(routing);

        assert_eq!(gate.check(), Reachability::Unreachable);
    }

    #[test]
    fn test_unreachable_without_root_address() {
        let gate = ReachabilityGate::new(StaticRouting::new(None));
        assert_eq!(gate.check(), Reachability::Unreachable);
    }

    #[test]
    fn test_check_is_not_cached() {
        let routing = Arc::new(StaticRouting::new(Some(root())));
        let gate = ReachabilityGate::new(routing.clone());

        assert!(gate.check().is_reachable());
        routing.set_reachable(false);
        assert!(!gate.check().is_reachable());
        routing.set_reachable(true);
        routing.set_root(None);
        assert!(!gate.check().is_reachable());
        routing.set_root(Some(root()));
        assert!(gate.check().is_reachable());
    }
}
