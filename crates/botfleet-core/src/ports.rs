//! Port allocation for worker processes
//!
//! Ports come from a monotonic counter and are never handed out twice in
//! one supervisor lifetime, even after the owning instance is deleted.

use std::sync::atomic::{AtomicU16, Ordering};

/// Default floor; the first issued port is one above it.
pub const DEFAULT_BASE_PORT: u16 = 4000;

/// Monotonic TCP port allocator
#[derive(Debug)]
pub struct PortAllocator {
    last_issued: AtomicU16,
}

impl PortAllocator {
    /// Issue ports starting at `base + 1`
    pub fn new(base: u16) -> Self {
        Self {
            last_issued: AtomicU16::new(base),
        }
    }

    /// Issue ports above both `base` and the highest port already on record
    pub fn seeded(base: u16, highest_persisted: Option<u16>) -> Self {
        Self::new(highest_persisted.map_or(base, |p| p.max(base)))
    }

    /// Issue the next port
    pub fn next(&self) -> u16 {
        self.last_issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued port (or the floor if none issued yet)
    pub fn last_issued(&self) -> u16 {
        self.last_issued.load(Ordering::SeqCst)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_port_above_base() {
        let ports = PortAllocator::default();
        assert_eq!(ports.next(), 4001);
        assert_eq!(ports.next(), 4002);
        assert_eq!(ports.last_issued(), 4002);
    }

    #[test]
    fn test_seeded_skips_persisted_ports() {
        let ports = PortAllocator::seeded(4000, Some(4017));
        assert_eq!(ports.next(), 4018);

        let ports = PortAllocator::seeded(4000, Some(80));
        assert_eq!(ports.next(), 4001);

        let ports = PortAllocator::seeded(4000, None);
        assert_eq!(ports.next(), 4001);
    }
}
