use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::console::DEFAULT_CONSOLE_CAPACITY;
use crate::overlay::{DEFAULT_OVERLAY_HEIGHT, DEFAULT_OVERLAY_WIDTH};

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Instruction batches a single resume or top-level callback may run.
    #[serde(default = "WatchdogConfig::default_budget")]
    pub budget: u32,
    /// Guest instructions per batch.
    #[serde(default = "WatchdogConfig::default_instruction_interval")]
    pub instruction_interval: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    /// Largest span a single memory hook registration may cover.
    #[serde(default = "HookConfig::default_max_span")]
    pub max_span: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "OverlayConfig::default_width")]
    pub width: u32,
    #[serde(default = "OverlayConfig::default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "ConsoleConfig::default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RandomConfig {
    /// Fixed seed for `math.random`; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub hooks: HookConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub random: RandomConfig,
}

#[derive(Debug, Clone, Default)]
pub struct BridgeConfigOverrides {
    pub watchdog_budget: Option<u32>,
    pub instruction_interval: Option<u32>,
    pub seed: Option<u64>,
}

impl WatchdogConfig {
    const fn default_budget() -> u32 {
        1_000
    }

    const fn default_instruction_interval() -> u32 {
        10_000
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { budget: Self::default_budget(), instruction_interval: Self::default_instruction_interval() }
    }
}

impl HookConfig {
    const fn default_max_span() -> u32 {
        0x1_0000
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self { max_span: Self::default_max_span() }
    }
}

impl OverlayConfig {
    const fn default_width() -> u32 {
        DEFAULT_OVERLAY_WIDTH
    }

    const fn default_height() -> u32 {
        DEFAULT_OVERLAY_HEIGHT
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { width: Self::default_width(), height: Self::default_height() }
    }
}

impl ConsoleConfig {
    const fn default_capacity() -> usize {
        DEFAULT_CONSOLE_CAPACITY
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { capacity: Self::default_capacity() }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &BridgeConfigOverrides) {
        if let Some(budget) = overrides.watchdog_budget {
            self.watchdog.budget = budget;
        }
        if let Some(interval) = overrides.instruction_interval {
            self.watchdog.instruction_interval = interval;
        }
        if let Some(seed) = overrides.seed {
            self.random.seed = Some(seed);
        }
    }
}

impl BridgeConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.watchdog_budget.is_none() && self.instruction_interval.is_none() && self.seed.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.watchdog_budget.is_some() {
            fields.push("watchdog.budget");
        }
        if self.instruction_interval.is_some() {
            fields.push("watchdog.instruction_interval");
        }
        if self.seed.is_some() {
            fields.push("random.seed");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: BridgeConfig = serde_json::from_str(r#"{ "watchdog": { "budget": 5 } }"#).expect("parse");
        assert_eq!(cfg.watchdog.budget, 5);
        assert_eq!(cfg.watchdog.instruction_interval, 10_000);
        assert_eq!(cfg.hooks.max_span, 0x1_0000);
        assert_eq!((cfg.overlay.width, cfg.overlay.height), (DEFAULT_OVERLAY_WIDTH, DEFAULT_OVERLAY_HEIGHT));
        assert_eq!(cfg.random.seed, None);
    }

    #[test]
    fn load_reads_json_from_disk() {
        let mut file = NamedTempFile::new().expect("temp config");
        write!(file, r#"{{ "console": {{ "capacity": 8 }}, "random": {{ "seed": 42 }} }}"#).expect("write");
        let cfg = BridgeConfig::load(file.path()).expect("load");
        assert_eq!(cfg.console.capacity, 8);
        assert_eq!(cfg.random.seed, Some(42));
    }

    #[test]
    fn unreadable_config_uses_defaults() {
        let cfg = BridgeConfig::load_or_default("definitely/not/here.json");
        assert_eq!(cfg.watchdog.budget, 1_000);
    }

    #[test]
    fn overrides_patch_only_given_fields() {
        let mut cfg = BridgeConfig::default();
        let overrides = BridgeConfigOverrides { watchdog_budget: Some(3), seed: Some(7), ..Default::default() };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.watchdog.budget, 3);
        assert_eq!(cfg.watchdog.instruction_interval, 10_000);
        assert_eq!(cfg.random.seed, Some(7));
        assert_eq!(overrides.applied_fields(), vec!["watchdog.budget", "random.seed"]);
    }
}
