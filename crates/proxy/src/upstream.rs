use authguard_common::UpstreamConfig;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks upstream servers with weighted round-robin.
pub struct UpstreamSelector {
    pub name: String,
    pub tls: bool,
    pub sni: String,
    addrs: Vec<String>,
    counter: AtomicUsize,
    /// Server index repeated once per unit of weight.
    weighted_indices: Vec<usize>,
}

impl UpstreamSelector {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        let addrs: Vec<String> = config.servers.iter().map(|s| s.addr.clone()).collect();

        // server 0 with weight 3 → [0, 0, 0]
        let mut weighted_indices: Vec<usize> = config
            .servers
            .iter()
            .enumerate()
            .flat_map(|(i, s)| std::iter::repeat(i).take(s.weight as usize))
            .collect();
        if weighted_indices.is_empty() {
            weighted_indices = (0..addrs.len()).collect();
        }

        Self {
            name: config.name.clone(),
            tls: config.tls,
            sni: config.sni.clone(),
            addrs,
            counter: AtomicUsize::new(0),
            weighted_indices,
        }
    }

    /// Select the next upstream server address.
    pub fn select(&self) -> Option<&str> {
        if self.weighted_indices.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.weighted_indices.len();
        self.addrs.get(self.weighted_indices[idx]).map(String::as_str)
    }

    pub fn server_count(&self) -> usize {
        self.addrs.len()
    }
}
