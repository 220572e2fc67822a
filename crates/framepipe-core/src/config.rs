// crates/framepipe-core/src/config.rs
//
// Tunable bounds that used to be unexplained magic numbers. Every stage
// constructor takes a `&EngineConfig` instead of hardcoding these.

/// Tunables shared by every stage in the pipeline. Deserializable so a
/// host can load these from a config file even though no loader lives in
/// this crate (out of scope per spec.md §1) — the struct itself is the
/// ambient-stack seam a loader would plug into.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Initial credit count per stream for each `CreditGate`.
    pub credit_bound: u32,
    /// Audio-master sync threshold τ, in milliseconds.
    pub sync_threshold_ms: u32,
    /// Latch poll timeout used by every worker thread's wait loop.
    pub latch_poll_ms: u32,
    /// Send an `EncodeProgress` every this many encoded video frames.
    pub encode_progress_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credit_bound: 3,
            sync_threshold_ms: 50,
            latch_poll_ms: 100,
            encode_progress_interval: 15,
        }
    }
}

impl EngineConfig {
    pub fn sync_threshold_secs(&self) -> f64 {
        self.sync_threshold_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.credit_bound, 3);
        assert_eq!(cfg.sync_threshold_ms, 50);
        assert_eq!(cfg.latch_poll_ms, 100);
        assert_eq!(cfg.encode_progress_interval, 15);
    }
}
