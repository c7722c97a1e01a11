/// Per-connection response cache
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Encoded responses keyed by request id, evicted strictly first-in
/// first-out. A hit does not refresh an entry's position.
#[derive(Debug)]
pub struct ResponseCache {
    entries: HashMap<u64, Vec<u8>>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, req_id: u64) -> Option<&[u8]> {
        self.entries.get(&req_id).map(Vec::as_slice)
    }

    /// Store a response. An id that is already cached keeps its first response.
    pub fn insert(&mut self, req_id: u64, payload: Vec<u8>) {
        if self.entries.contains_key(&req_id) {
            return;
        }

        self.entries.insert(req_id, payload);
        self.order.push_back(req_id);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
