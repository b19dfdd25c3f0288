// Atlas configuration. The host picks the storage format; every field has a
// serde default so partial documents deserialize.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What `Insert` does when the eviction budget runs out without making room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BudgetExhaustion {
    /// Give up; the caller keeps its placeholder glyph.
    #[default]
    Fail,
    /// Evict slots used in the current frame as a last resort, oldest first.
    ForceEvictPinned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlasConfig {
    /// Width and height of every atlas page, in texels.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Gap reserved right of and below every slot.
    #[serde(default = "default_padding")]
    pub padding: u32,
    /// Eviction attempts (evictions plus pinned skips) one insert may spend.
    #[serde(default = "default_eviction_budget")]
    pub eviction_budget: u32,
    #[serde(default)]
    pub budget_exhaustion: BudgetExhaustion,
    /// Occupancy above which a page that failed an allocation stops being
    /// offered new allocations until space is freed on it.
    #[serde(default = "default_seal_threshold")]
    pub seal_threshold: f32,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Adapter invocations per request before a generation failure sticks.
    #[serde(default = "default_generation_attempts")]
    pub generation_attempts: u32,
    /// Frames a key that failed with a full atlas waits before it is retried.
    #[serde(default = "default_atlas_full_retry_frames")]
    pub atlas_full_retry_frames: u64,
}

fn default_page_size() -> u32 {
    2048
}

fn default_max_pages() -> u32 {
    4
}

fn default_padding() -> u32 {
    1
}

fn default_eviction_budget() -> u32 {
    64
}

fn default_seal_threshold() -> f32 {
    0.95
}

fn default_worker_threads() -> usize {
    2
}

fn default_generation_attempts() -> u32 {
    2
}

fn default_atlas_full_retry_frames() -> u64 {
    60
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            padding: default_padding(),
            eviction_budget: default_eviction_budget(),
            budget_exhaustion: BudgetExhaustion::default(),
            seal_threshold: default_seal_threshold(),
            worker_threads: default_worker_threads(),
            generation_attempts: default_generation_attempts(),
            atlas_full_retry_frames: default_atlas_full_retry_frames(),
        }
    }
}

impl AtlasConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > 16384 {
            return Err(ConfigError::PageSize(self.page_size));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::MaxPages);
        }
        if self.padding >= self.page_size {
            return Err(ConfigError::Padding {
                padding: self.padding,
                page_size: self.page_size,
            });
        }
        if !(0.0..=1.0).contains(&self.seal_threshold) {
            return Err(ConfigError::SealThreshold(self.seal_threshold));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::WorkerThreads);
        }
        if self.generation_attempts == 0 {
            return Err(ConfigError::GenerationAttempts);
        }
        Ok(())
    }

    /// Worker count actually spawned: never more than the machine offers.
    pub fn effective_worker_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_threads.clamp(1, available.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AtlasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 2048);
        assert_eq!(config.budget_exhaustion, BudgetExhaustion::Fail);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AtlasConfig = serde_json::from_str(
            r#"{ "page_size": 512, "budget_exhaustion": "ForceEvictPinned" }"#,
        )
        .unwrap();
        assert_eq!(config.page_size, 512);
        assert_eq!(config.max_pages, 4);
        assert_eq!(config.budget_exhaustion, BudgetExhaustion::ForceEvictPinned);
        assert_eq!(config.generation_attempts, 2);
    }

    #[test]
    fn test_round_trip() {
        let config = AtlasConfig {
            max_pages: 1,
            seal_threshold: 0.5,
            ..AtlasConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AtlasConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad = |config: AtlasConfig| config.validate().unwrap_err();
        assert_eq!(
            bad(AtlasConfig {
                page_size: 0,
                ..AtlasConfig::default()
            }),
            ConfigError::PageSize(0)
        );
        assert_eq!(
            bad(AtlasConfig {
                max_pages: 0,
                ..AtlasConfig::default()
            }),
            ConfigError::MaxPages
        );
        assert_eq!(
            bad(AtlasConfig {
                seal_threshold: 1.5,
                ..AtlasConfig::default()
            }),
            ConfigError::SealThreshold(1.5)
        );
        assert_eq!(
            bad(AtlasConfig {
                worker_threads: 0,
                ..AtlasConfig::default()
            }),
            ConfigError::WorkerThreads
        );
        assert!(matches!(
            bad(AtlasConfig {
                page_size: 64,
                padding: 64,
                ..AtlasConfig::default()
            }),
            ConfigError::Padding { .. }
        ));
    }

    #[test]
    fn test_effective_workers_is_at_least_one() {
        let config = AtlasConfig {
            worker_threads: 10_000,
            ..AtlasConfig::default()
        };
        let n = config.effective_worker_threads();
        assert!(n >= 1 && n < 10_000);
    }
}
