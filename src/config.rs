use serde::{Deserialize, Serialize};

/// Tunable thresholds for the advisory engine. The defaults mirror the
/// values the analyzers were calibrated against; both are exposed as CLI
/// flags rather than hardcoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// An index with fewer observed scans than this is classified as
    /// ineffective (PostgreSQL usage-statistics path).
    pub usage_threshold: i64,
    /// A slow query with more calls than this yields high-priority
    /// create recommendations; at or below it, medium.
    pub high_priority_calls: i64,
    /// Maximum number of slow queries pulled from engine statistics per
    /// analysis pass.
    pub slow_query_limit: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            usage_threshold: 10,
            high_priority_calls: 100,
            slow_query_limit: 20,
        }
    }
}

impl AdvisorConfig {
    pub fn with_usage_threshold(mut self, threshold: i64) -> Self {
        self.usage_threshold = threshold;
        self
    }

    pub fn with_high_priority_calls(mut self, calls: i64) -> Self {
        self.high_priority_calls = calls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = AdvisorConfig::default();
        assert_eq!(config.usage_threshold, 10);
        assert_eq!(config.high_priority_calls, 100);
    }
}
