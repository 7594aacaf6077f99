use std::time::Duration;

/// Configuration of the pending transaction pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Chain id every admitted transaction must carry.
    pub chain_id: u32,
    /// Maximum number of live pool entries.
    pub max_entries: u64,
    /// How long a just-mined or just-swept hash stays blocked.
    pub cooldown: Duration,
    /// Upper bound on per-scan deferred evictions.
    pub drop_queue_limit: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            chain_id: 1,
            max_entries: 16_384,
            cooldown: Duration::from_secs(20),
            drop_queue_limit: 1000,
        }
    }
}

impl PoolOptions {
    pub fn builder() -> PoolOptionsBuilder {
        PoolOptionsBuilder::default()
    }
}

/// Builder for [`PoolOptions`].
#[derive(Debug, Default)]
pub struct PoolOptionsBuilder {
    chain_id: Option<u32>,
    max_entries: Option<u64>,
    cooldown: Option<Duration>,
    drop_queue_limit: Option<usize>,
}

impl PoolOptionsBuilder {
    pub fn chain_id(mut self, chain_id: u32) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn drop_queue_limit(mut self, limit: usize) -> Self {
        self.drop_queue_limit = Some(limit);
        self
    }

    pub fn build(self) -> PoolOptions {
        let defaults = PoolOptions::default();
        PoolOptions {
            chain_id: self.chain_id.unwrap_or(defaults.chain_id),
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            cooldown: self.cooldown.unwrap_or(defaults.cooldown),
            drop_queue_limit: self.drop_queue_limit.unwrap_or(defaults.drop_queue_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_selected_fields() {
        let opts = PoolOptions::builder()
            .chain_id(9)
            .cooldown(Duration::from_secs(5))
            .build();
        assert_eq!(opts.chain_id, 9);
        assert_eq!(opts.cooldown, Duration::from_secs(5));
        assert_eq!(opts.max_entries, PoolOptions::default().max_entries);
        assert_eq!(opts.drop_queue_limit, 1000);
    }
}
