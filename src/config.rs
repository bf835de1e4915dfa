//! Engine configuration
//!
//! Balancing tables (flip budgets, multipliers, recall timings) are inputs
//! here rather than constants in the rule modules. Loaded from an optional
//! TOML file, then environment overrides, then validated.

use crate::amount::{Amount, Multiplier};
use crate::errors::{ArcadeResult, ConfigurationError};
use crate::games::{
    Difficulty, GridSize, MatchingRules, RecallRules, ReflexRules, TapDuration, VariantConfig,
    VariantRules,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArcadeConfig {
    pub engine: EngineConfig,
    pub matching: MatchingConfig,
    pub reflex: ReflexConfig,
    pub recall: RecallConfig,
}

impl Default for ArcadeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            matching: MatchingConfig::default(),
            reflex: ReflexConfig::default(),
            recall: RecallConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timer resolution; at most 100ms
    pub tick_interval_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub confirmation_poll_ms: u64,
    pub min_stake: Amount,
    /// Length of the generated recall sequence
    pub sequence_length: usize,
    /// Capacity of the session event channel
    pub event_capacity: usize,
    /// Wallet bound at startup, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            confirmation_timeout_ms: 30_000,
            confirmation_poll_ms: 500,
            min_stake: Amount::from_units(100), // 0.0001
            sequence_length: 50,
            event_capacity: 256,
            identity: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingTier {
    pub grid_size: GridSize,
    pub max_flips: u32,
    pub multiplier: Multiplier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// How long a mismatched pair stays face-up
    pub mismatch_hide_ms: u64,
    pub tiers: Vec<MatchingTier>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            mismatch_hide_ms: 1000,
            tiers: vec![
                MatchingTier {
                    grid_size: GridSize::Two,
                    max_flips: 3,
                    multiplier: Multiplier::from_bps(12_000),
                },
                MatchingTier {
                    grid_size: GridSize::Four,
                    max_flips: 14,
                    multiplier: Multiplier::from_bps(15_000),
                },
                MatchingTier {
                    grid_size: GridSize::Six,
                    max_flips: 30,
                    multiplier: Multiplier::from_bps(20_000),
                },
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReflexTier {
    pub duration: TapDuration,
    pub multiplier: Multiplier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReflexConfig {
    pub points_per_hit: u64,
    pub penalty_per_miss: u64,
    /// Sustained score rate treated as a perfect run
    pub max_score_per_second: u64,
    pub board_size: usize,
    pub tiers: Vec<ReflexTier>,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            points_per_hit: 10,
            penalty_per_miss: 5,
            max_score_per_second: 6,
            board_size: 48,
            tiers: vec![
                ReflexTier {
                    duration: TapDuration::Fifteen,
                    multiplier: Multiplier::from_bps(20_000),
                },
                ReflexTier {
                    duration: TapDuration::Thirty,
                    multiplier: Multiplier::from_bps(16_000),
                },
                ReflexTier {
                    duration: TapDuration::Sixty,
                    multiplier: Multiplier::from_bps(13_000),
                },
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecallTier {
    pub difficulty: Difficulty,
    pub signal_display_ms: u64,
    pub base_input_secs: f64,
    pub per_signal_secs: f64,
    pub multiplier: Multiplier,
    pub target_level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Dark pause between the last lit symbol and the input phase
    pub reveal_gap_ms: u64,
    pub symbols: u32,
    pub tiers: Vec<RecallTier>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            reveal_gap_ms: 500,
            symbols: 4,
            tiers: vec![
                RecallTier {
                    difficulty: Difficulty::Easy,
                    signal_display_ms: 1000,
                    base_input_secs: 5.0,
                    per_signal_secs: 1.5,
                    multiplier: Multiplier::from_bps(13_000),
                    target_level: 16,
                },
                RecallTier {
                    difficulty: Difficulty::Medium,
                    signal_display_ms: 700,
                    base_input_secs: 4.0,
                    per_signal_secs: 1.0,
                    multiplier: Multiplier::from_bps(16_000),
                    target_level: 12,
                },
                RecallTier {
                    difficulty: Difficulty::Hard,
                    signal_display_ms: 500,
                    base_input_secs: 3.0,
                    per_signal_secs: 0.7,
                    multiplier: Multiplier::from_bps(20_000),
                    target_level: 8,
                },
            ],
        }
    }
}

impl ArcadeConfig {
    /// Looks up the balancing tables for the player's pick.
    pub fn resolve(&self, choice: &VariantConfig) -> Result<VariantRules, ConfigurationError> {
        match *choice {
            VariantConfig::Matching { grid_size } => {
                let tier = self
                    .matching
                    .tiers
                    .iter()
                    .find(|t| t.grid_size == grid_size)
                    .ok_or_else(|| missing_tier("matching.tiers", grid_size.side()))?;
                Ok(VariantRules::Matching(MatchingRules {
                    grid_size,
                    total_pairs: grid_size.total_pairs(),
                    max_flips: tier.max_flips,
                    multiplier: tier.multiplier,
                    mismatch_hide: Duration::from_millis(self.matching.mismatch_hide_ms),
                }))
            }
            VariantConfig::ReflexTap { duration } => {
                let tier = self
                    .reflex
                    .tiers
                    .iter()
                    .find(|t| t.duration == duration)
                    .ok_or_else(|| missing_tier("reflex.tiers", duration.secs()))?;
                Ok(VariantRules::ReflexTap(ReflexRules {
                    duration_secs: duration.secs(),
                    multiplier: tier.multiplier,
                    points_per_hit: self.reflex.points_per_hit,
                    penalty_per_miss: self.reflex.penalty_per_miss,
                    max_score_per_second: self.reflex.max_score_per_second,
                    board_size: self.reflex.board_size,
                }))
            }
            VariantConfig::SequentialRecall { difficulty } => {
                let tier = self
                    .recall
                    .tiers
                    .iter()
                    .find(|t| t.difficulty == difficulty)
                    .ok_or_else(|| missing_tier("recall.tiers", difficulty))?;
                Ok(VariantRules::SequentialRecall(RecallRules {
                    difficulty,
                    signal_display: Duration::from_millis(tier.signal_display_ms),
                    reveal_gap: Duration::from_millis(self.recall.reveal_gap_ms),
                    base_input_secs: tier.base_input_secs,
                    per_signal_secs: tier.per_signal_secs,
                    multiplier: tier.multiplier,
                    target_level: tier.target_level,
                    sequence_length: self.engine.sequence_length,
                    symbols: self.recall.symbols,
                }))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let engine = &self.engine;
        if engine.tick_interval_ms == 0 || engine.tick_interval_ms > 100 {
            return Err(invalid(
                "engine.tick_interval_ms",
                engine.tick_interval_ms,
                "must be between 1 and 100",
            ));
        }
        if engine.confirmation_poll_ms == 0
            || engine.confirmation_poll_ms >= engine.confirmation_timeout_ms
        {
            return Err(invalid(
                "engine.confirmation_poll_ms",
                engine.confirmation_poll_ms,
                "must be positive and below confirmation_timeout_ms",
            ));
        }
        if !engine.min_stake.is_positive() {
            return Err(invalid("engine.min_stake", engine.min_stake, "must be positive"));
        }
        if engine.sequence_length == 0 {
            return Err(invalid("engine.sequence_length", 0, "must be > 0"));
        }
        if engine.event_capacity == 0 {
            return Err(invalid("engine.event_capacity", 0, "must be > 0"));
        }

        for grid_size in [GridSize::Two, GridSize::Four, GridSize::Six] {
            let rules = self.resolve(&VariantConfig::Matching { grid_size })?;
            if let VariantRules::Matching(rules) = rules {
                if rules.max_flips == 0 {
                    return Err(invalid("matching.tiers.max_flips", 0, "must be > 0"));
                }
            }
        }

        for duration in [TapDuration::Fifteen, TapDuration::Thirty, TapDuration::Sixty] {
            self.resolve(&VariantConfig::ReflexTap { duration })?;
        }
        if self.reflex.max_score_per_second == 0 {
            return Err(invalid("reflex.max_score_per_second", 0, "must be > 0"));
        }
        if self.reflex.board_size == 0 {
            return Err(invalid("reflex.board_size", 0, "must be > 0"));
        }

        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            self.resolve(&VariantConfig::SequentialRecall { difficulty })?;
        }
        if self.recall.symbols < 2 {
            return Err(invalid("recall.symbols", self.recall.symbols, "need at least 2 symbols"));
        }
        for tier in &self.recall.tiers {
            if tier.target_level == 0 {
                return Err(invalid("recall.tiers.target_level", 0, "must be > 0"));
            }
            if !tier.base_input_secs.is_finite() || tier.base_input_secs <= 0.0 {
                return Err(invalid(
                    "recall.tiers.base_input_secs",
                    tier.base_input_secs,
                    "must be a finite number > 0",
                ));
            }
            if !tier.per_signal_secs.is_finite() || tier.per_signal_secs < 0.0 {
                return Err(invalid(
                    "recall.tiers.per_signal_secs",
                    tier.per_signal_secs,
                    "must be a finite number >= 0",
                ));
            }
        }

        let multipliers = self
            .matching
            .tiers
            .iter()
            .map(|t| t.multiplier)
            .chain(self.reflex.tiers.iter().map(|t| t.multiplier))
            .chain(self.recall.tiers.iter().map(|t| t.multiplier));
        for multiplier in multipliers {
            if multiplier.bps() == 0 {
                return Err(invalid("multiplier", multiplier, "must be > 0"));
            }
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.confirmation_timeout_ms)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.engine.confirmation_poll_ms)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn missing_tier(table: &str, key: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::MissingRequired(format!("{} entry for {}", table, key))
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> ArcadeResult<ArcadeConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            ArcadeConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> ArcadeResult<ArcadeConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut ArcadeConfig) -> ArcadeResult<()> {
        self.apply_overrides(config, |key| env::var(key).ok())
    }

    /// Applies `ARCADE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&self, config: &mut ArcadeConfig, lookup: F) -> ArcadeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ARCADE_TICK_INTERVAL_MS") {
            config.engine.tick_interval_ms = parse_override("ARCADE_TICK_INTERVAL_MS", value)?;
        }
        if let Some(value) = lookup("ARCADE_CONFIRMATION_TIMEOUT_MS") {
            config.engine.confirmation_timeout_ms =
                parse_override("ARCADE_CONFIRMATION_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("ARCADE_CONFIRMATION_POLL_MS") {
            config.engine.confirmation_poll_ms = parse_override("ARCADE_CONFIRMATION_POLL_MS", value)?;
        }
        if let Some(value) = lookup("ARCADE_MIN_STAKE") {
            config.engine.min_stake = parse_override("ARCADE_MIN_STAKE", value)?;
        }
        if let Some(identity) = lookup("ARCADE_IDENTITY") {
            config.engine.identity = Some(identity);
        }
        Ok(())
    }

    pub fn save(&self, config: &ArcadeConfig, path: &str) -> ArcadeResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_override<T>(field: &str, value: String) -> Result<T, ConfigurationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigurationError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
        value,
    })
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: ArcadeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ArcadeConfig::default(),
        }
    }

    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn matching(mut self, matching: MatchingConfig) -> Self {
        self.config.matching = matching;
        self
    }

    pub fn reflex(mut self, reflex: ReflexConfig) -> Self {
        self.config.reflex = reflex;
        self
    }

    pub fn recall(mut self, recall: RecallConfig) -> Self {
        self.config.recall = recall;
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.engine.tick_interval_ms = ms;
        self
    }

    pub fn confirmation(mut self, timeout_ms: u64, poll_ms: u64) -> Self {
        self.config.engine.confirmation_timeout_ms = timeout_ms;
        self.config.engine.confirmation_poll_ms = poll_ms;
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.config.engine.identity = Some(identity.into());
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ArcadeConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the default configuration to `path`.
pub fn generate_sample_config(path: &str) -> ArcadeResult<()> {
    ConfigLoader::new().save(&ArcadeConfig::default(), path)
}
