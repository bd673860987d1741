use crate::config::BridgeConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_FRAMES: u32 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    script: Option<PathBuf>,
    frames: Option<u32>,
    config: Option<PathBuf>,
    watchdog_budget: Option<u32>,
    instruction_interval: Option<u32>,
    seed: Option<u64>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Use --script <path> and other flags with values.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "script" => overrides.script = Some(PathBuf::from(value)),
                "config" => overrides.config = Some(PathBuf::from(value)),
                "frames" => {
                    overrides.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "watchdog-budget" => {
                    overrides.watchdog_budget = Some(
                        value.parse::<u32>().with_context(|| format!("Invalid watchdog budget '{value}'"))?,
                    );
                }
                "instruction-interval" => {
                    overrides.instruction_interval = Some(
                        value
                            .parse::<u32>()
                            .with_context(|| format!("Invalid instruction interval '{value}'"))?,
                    );
                }
                "seed" => {
                    overrides.seed = Some(value.parse::<u64>().with_context(|| format!("Invalid seed '{value}'"))?);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --script, --frames, --config, --watchdog-budget, \
                     --instruction-interval, --seed."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn script(&self) -> Option<&PathBuf> {
        self.script.as_ref()
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn frames(&self) -> u32 {
        self.frames.unwrap_or(DEFAULT_FRAMES)
    }

    pub fn config_overrides(&self) -> BridgeConfigOverrides {
        BridgeConfigOverrides {
            watchdog_budget: self.watchdog_budget,
            instruction_interval: self.instruction_interval,
            seed: self.seed,
        }
    }
}
