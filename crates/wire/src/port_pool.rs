use std::collections::HashSet;

use rand::Rng;

/// A per-owner pool of randomly-allocated ports in `[10000, 20000]`,
/// reserved immediately on allocation so two concurrent callers (e.g. two
/// topics registering in the same poll tick) never race for the same port.
#[derive(Debug, Default)]
pub struct PortPool {
    used: HashSet<u16>,
}

pub const RANGE_START: u16 = 10_000;
pub const RANGE_END: u16 = 20_000;

impl PortPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a uniform-random unused port in the pool's range and reserves
    /// it. Returns `None` if the range is exhausted (20001 ports; in
    /// practice unreachable for this system's client counts).
    pub fn allocate(&mut self) -> Option<u16> {
        if self.used.len() as u32 >= (RANGE_END - RANGE_START) as u32 + 1 {
            return None;
        }

        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(RANGE_START..=RANGE_END);
            if self.used.insert(candidate) {
                return Some(candidate);
            }
        }
    }

    pub fn release(&mut self, port: u16) {
        self.used.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ports_are_within_range_and_unique() {
        let mut pool = PortPool::new();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let port = pool.allocate().unwrap();
            assert!((RANGE_START..=RANGE_END).contains(&port));
            assert!(seen.insert(port));
        }
    }

    #[test]
    fn released_ports_can_be_reallocated() {
        let mut pool = PortPool::new();
        let port = pool.allocate().unwrap();
        pool.release(port);
        assert!(!pool.used.contains(&port));
    }
}
