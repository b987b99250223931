//! address allocation for new nodes.
//!
//! a random starting point in the cgnat range is walked forward until the
//! caller reports a free address. the check is not atomic with the insert
//! that follows it: the partial unique indexes on `nodes.ipv4`/`nodes.ipv6`
//! reject the loser of a race and the caller allocates again.

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, PoisonError};

use ipnet::Ipv4Net;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::Error;

/// the shared address space every tailnet allocates from.
pub const CGNAT_RANGE: Ipv4Net = match Ipv4Net::new(Ipv4Addr::new(100, 64, 0, 0), 10) {
    Ok(net) => net,
    Err(_) => panic!("invalid cgnat range"),
};

/// the quad-100 service address.
const SERVICE_ADDR: Ipv4Addr = Ipv4Addr::new(100, 100, 100, 100);

/// reserved for chromeos vm networking.
const CHROMEOS_RANGE: Ipv4Net = match Ipv4Net::new(Ipv4Addr::new(100, 115, 92, 0), 23) {
    Ok(net) => net,
    Err(_) => panic!("invalid chromeos range"),
};

/// ula prefix the ipv4 address is embedded into.
const V6_PREFIX: [u16; 6] = [0xfd7a, 0x115c, 0xa1e0, 0xab12, 0x4843, 0xcd96];

/// errors from [`AddressAllocator::allocate`].
#[derive(Debug, Error)]
pub enum AllocationError {
    /// every candidate in the range is taken.
    #[error("address range {0} is exhausted")]
    Exhausted(Ipv4Net),

    /// the existence check failed.
    #[error("address lookup failed: {0}")]
    Lookup(#[from] Error),
}

/// allocates node address pairs.
pub struct AddressAllocator {
    range: Ipv4Net,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for AddressAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressAllocator")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressAllocator {
    /// allocator over `100.64.0.0/10` seeded from the os.
    pub fn new() -> Self {
        Self {
            range: CGNAT_RANGE,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// allocator with a fixed seed, for reproducible probing.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            range: CGNAT_RANGE,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// restrict allocation to a smaller range.
    pub fn with_range(mut self, range: Ipv4Net) -> Self {
        self.range = range.trunc();
        self
    }

    /// the range addresses are drawn from.
    pub fn range(&self) -> Ipv4Net {
        self.range
    }

    /// find a free address pair.
    ///
    /// `exists` reports whether a live node already holds a candidate.
    /// candidates are tried in order from a random start, wrapping at the
    /// end of the range.
    pub async fn allocate<F, Fut>(&self, mut exists: F) -> Result<(Ipv4Addr, Ipv6Addr), AllocationError>
    where
        F: FnMut(Ipv4Addr) -> Fut,
        Fut: Future<Output = Result<bool, Error>>,
    {
        let base = u32::from(self.range.network());
        let size: u64 = 1u64 << (32 - u32::from(self.range.prefix_len()));

        // the guard must not live across the awaits below
        let start = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.random_range(0..size)
        };

        for step in 0..size {
            let offset = (start + step) % size;
            let candidate = Ipv4Addr::from(base.wrapping_add(offset as u32));
            if !self.is_usable(candidate) {
                continue;
            }
            if !exists(candidate).await? {
                return Ok((candidate, embed_v6(candidate)));
            }
        }

        Err(AllocationError::Exhausted(self.range))
    }

    fn is_usable(&self, addr: Ipv4Addr) -> bool {
        // /31 and /32 have no network or broadcast address
        let edges = self.range.prefix_len() < 31
            && (addr == self.range.network() || addr == self.range.broadcast());
        !edges && addr != SERVICE_ADDR && !CHROMEOS_RANGE.contains(&addr)
    }
}

/// the ipv6 address paired with an ipv4 address.
pub fn embed_v6(v4: Ipv4Addr) -> Ipv6Addr {
    let bits = u32::from(v4);
    Ipv6Addr::new(
        V6_PREFIX[0],
        V6_PREFIX[1],
        V6_PREFIX[2],
        V6_PREFIX[3],
        V6_PREFIX[4],
        V6_PREFIX[5],
        (bits >> 16) as u16,
        bits as u16,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    async fn free(_: Ipv4Addr) -> Result<bool, Error> {
        Ok(false)
    }

    #[tokio::test]
    async fn test_same_seed_same_address() {
        let (a, _) = AddressAllocator::with_seed(7).allocate(free).await.unwrap();
        let (b, _) = AddressAllocator::with_seed(7).allocate(free).await.unwrap();
        assert_eq!(a, b);
        assert!(CGNAT_RANGE.contains(&a));
    }

    #[tokio::test]
    async fn test_busy_candidates_are_skipped_in_order() {
        const BUSY: usize = 5;

        let (first, _) = AddressAllocator::with_seed(42).allocate(free).await.unwrap();

        let mut tried = Vec::new();
        let (got, v6) = AddressAllocator::with_seed(42)
            .allocate(|ip| {
                tried.push(ip);
                let busy = tried.len() <= BUSY;
                async move { Ok(busy) }
            })
            .await
            .unwrap();

        assert_eq!(tried.len(), BUSY + 1);
        assert_eq!(tried[0], first);
        assert_eq!(got, tried[BUSY]);
        assert_ne!(got, first);
        assert_eq!(v6, embed_v6(got));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let allocator = AddressAllocator::with_seed(1).with_range(net("10.0.0.0/29"));

        let mut seen = HashSet::new();
        let result = allocator
            .allocate(|ip| {
                seen.insert(ip);
                async { Ok(true) }
            })
            .await;

        assert!(matches!(result, Err(AllocationError::Exhausted(_))));
        // six hosts, network and broadcast never tried
        assert_eq!(seen.len(), 6);
        assert!(!seen.contains(&Ipv4Addr::new(10, 0, 0, 0)));
        assert!(!seen.contains(&Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[tokio::test]
    async fn test_reserved_addresses_never_returned() {
        let allocator = AddressAllocator::with_seed(3).with_range(net("100.100.100.100/31"));
        let (got, _) = allocator.allocate(free).await.unwrap();
        assert_eq!(got, Ipv4Addr::new(100, 100, 100, 101));

        let chromeos = AddressAllocator::with_seed(3).with_range(net("100.115.92.0/23"));
        assert!(matches!(
            chromeos.allocate(free).await,
            Err(AllocationError::Exhausted(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_errors_propagate() {
        let result = AddressAllocator::with_seed(9)
            .allocate(|_| async { Err(Error::Connection("gone".into())) })
            .await;
        assert!(matches!(result, Err(AllocationError::Lookup(_))));
    }

    #[test]
    fn test_v6_embedding() {
        assert_eq!(
            embed_v6(Ipv4Addr::new(100, 64, 1, 2)),
            "fd7a:115c:a1e0:ab12:4843:cd96:6440:102".parse::<Ipv6Addr>().unwrap()
        );
    }
}
