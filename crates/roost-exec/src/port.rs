use std::{
    collections::{HashSet, VecDeque},
    sync::{Mutex, PoisonError},
};

use tracing::trace;

use crate::error::ExecError;

#[derive(Debug)]
struct Pool {
    released: VecDeque<u16>,
    /// Next never-used port; `None` once the range is used up.
    next: Option<u16>,
    in_use: HashSet<u16>,
}

/// Hands out listen ports for spawned processes.
///
/// Released ports are reused first, oldest release first; otherwise the next never
/// used port of the range is taken. A port is never handed out twice while in use.
#[derive(Debug)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    pool: Mutex<Pool>,
}

impl PortAllocator {
    /// Allocator over `start..=end`.
    pub fn new(start: u16, end: u16) -> Result<Self, ExecError> {
        if start == 0 || start > end {
            return Err(ExecError::InvalidConfig(format!(
                "invalid port range {start}..={end}"
            )));
        }
        Ok(Self {
            start,
            end,
            pool: Mutex::new(Pool {
                released: VecDeque::new(),
                next: Some(start),
                in_use: HashSet::new(),
            }),
        })
    }

    pub fn allocate(&self) -> Result<u16, ExecError> {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);

        let port = match pool.released.pop_front() {
            Some(port) => port,
            None => {
                let port = pool.next.ok_or(ExecError::PortsExhausted {
                    start: self.start,
                    end: self.end,
                })?;
                pool.next = port.checked_add(1).filter(|&p| p <= self.end);
                port
            }
        };
        pool.in_use.insert(port);
        trace!(target: "roost.exec", port, "port allocated");
        Ok(port)
    }

    /// Return a port. Ports that are not in use are ignored.
    pub fn release(&self, port: u16) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.in_use.remove(&port) {
            pool.released.push_back(port);
            trace!(target: "roost.exec", port, "port released");
        }
    }

    pub fn in_use(&self) -> usize {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_use
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn hands_out_sequential_ports_then_reuses_released() {
        let ports = PortAllocator::new(7000, 7010).unwrap();
        assert_eq!(ports.allocate().unwrap(), 7000);
        assert_eq!(ports.allocate().unwrap(), 7001);

        ports.release(7000);
        assert_eq!(ports.allocate().unwrap(), 7000);
        assert_eq!(ports.allocate().unwrap(), 7002);
    }

    #[test]
    fn exhausted_range_is_an_error() {
        let ports = PortAllocator::new(9000, 9001).unwrap();
        ports.allocate().unwrap();
        ports.allocate().unwrap();
        assert!(matches!(
            ports.allocate(),
            Err(ExecError::PortsExhausted { .. })
        ));

        ports.release(9001);
        assert_eq!(ports.allocate().unwrap(), 9001);
    }

    #[test]
    fn double_release_does_not_duplicate_port() {
        let ports = PortAllocator::new(8000, 8100).unwrap();
        let p = ports.allocate().unwrap();
        ports.release(p);
        ports.release(p);
        ports.release(8050);

        let a = ports.allocate().unwrap();
        let b = ports.allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(ports.in_use(), 2);
    }

    #[test]
    fn range_ending_at_u16_max_does_not_overflow() {
        let ports = PortAllocator::new(u16::MAX, u16::MAX).unwrap();
        assert_eq!(ports.allocate().unwrap(), u16::MAX);
        assert!(ports.allocate().is_err());
    }

    #[test]
    fn invalid_range_is_rejected() {
        assert!(PortAllocator::new(0, 10).is_err());
        assert!(PortAllocator::new(10, 9).is_err());
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let ports = Arc::new(PortAllocator::new(10_000, 10_999).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ports = Arc::clone(&ports);
                std::thread::spawn(move || {
                    (0..100).map(|_| ports.allocate().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
    }
}
