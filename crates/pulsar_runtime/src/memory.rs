//! Cycle-accurate memory-timing model.
//!
//! [`MemoryModel`] stands in for an external DRAM simulator: requests are
//! admitted with bounded in-flight capacity, take a fixed round-trip
//! latency in cycles, and surface as [`MemResponse`]s the driver loop
//! drains after the tick boundary. The two-phase advance
//! ([`frontend_tick`](MemoryModel::frontend_tick) admits requests sent this
//! cycle, [`memory_system_tick`](MemoryModel::memory_system_tick) ages the
//! in-flight queue) mirrors the frontend/backend split of the real
//! memory-system interface.

use std::collections::VecDeque;

/// The default round-trip latency, in cycles.
pub const DEFAULT_LATENCY: u64 = 10;

/// The default in-flight request capacity.
pub const DEFAULT_CAPACITY: usize = 16;

/// A completed memory request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemResponse {
    /// The request address.
    pub addr: i64,
    /// `true` for a write completion.
    pub is_write: bool,
    /// The cycle the request was issued.
    pub issued_at: u64,
}

#[derive(Debug, Clone)]
struct Inflight {
    completes_at: u64,
    addr: i64,
    is_write: bool,
    issued_at: u64,
}

/// A fixed-latency DRAM stand-in with bounded in-flight requests.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    latency: u64,
    capacity: usize,
    cycle: u64,
    accepted: Vec<(i64, bool)>,
    inflight: VecDeque<Inflight>,
    ready: VecDeque<MemResponse>,
}

impl MemoryModel {
    /// Creates a model with the given round-trip latency and default
    /// capacity.
    pub fn new(latency: u64) -> Self {
        Self::with_capacity(latency, DEFAULT_CAPACITY)
    }

    /// Creates a model with explicit latency and in-flight capacity.
    pub fn with_capacity(latency: u64, capacity: usize) -> Self {
        Self {
            latency: latency.max(1),
            capacity: capacity.max(1),
            cycle: 0,
            accepted: Vec::new(),
            inflight: VecDeque::new(),
            ready: VecDeque::new(),
        }
    }

    /// The current memory cycle.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Issues a request. Returns `false` (and drops the request) when the
    /// in-flight window is full; the issuer retries on a later cycle.
    pub fn send_request(&mut self, addr: i64, is_write: bool) -> bool {
        if self.inflight.len() + self.accepted.len() >= self.capacity {
            return false;
        }
        self.accepted.push((addr, is_write));
        true
    }

    /// Admits the requests accepted this cycle into the in-flight queue.
    pub fn frontend_tick(&mut self) {
        for (addr, is_write) in self.accepted.drain(..) {
            self.inflight.push_back(Inflight {
                completes_at: self.cycle + self.latency,
                addr,
                is_write,
                issued_at: self.cycle,
            });
        }
    }

    /// Advances one cycle and moves completed requests to the ready queue.
    pub fn memory_system_tick(&mut self) {
        self.cycle += 1;
        while let Some(front) = self.inflight.front() {
            if front.completes_at <= self.cycle {
                let done = self.inflight.pop_front().expect("front exists");
                self.ready.push_back(MemResponse {
                    addr: done.addr,
                    is_write: done.is_write,
                    issued_at: done.issued_at,
                });
            } else {
                break;
            }
        }
    }

    /// `true` when a completed response is waiting.
    pub fn has_response(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Takes the oldest completed response.
    pub fn pop_response(&mut self) -> Option<MemResponse> {
        self.ready.pop_front()
    }
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}
