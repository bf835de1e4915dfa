//! Wager Arcade - game session and reward settlement engine
//!
//! Players stake tokens, play a short skill game, and are paid
//! `stake × multiplier × performance` through an escrow gateway. The rule
//! modules are pure and clock-free; the session layer owns the lifecycle and
//! coordinates it with asynchronous deposit and withdraw transactions.

pub mod amount;
pub mod config;
pub mod errors;
pub mod fairness;
pub mod games;
pub mod gateway;
pub mod reward;
pub mod session;

pub use amount::{Amount, Multiplier, PerformanceRatio};
pub use config::{ArcadeConfig, ConfigBuilder, ConfigLoader};
pub use errors::{ArcadeError, ArcadeResult, ConfigurationError, SessionError};
pub use fairness::{FixedSeedSource, OsSeedSource, SeedSource};
pub use games::{GameInput, GameProgress, GameVariant, VariantConfig};
pub use gateway::{InMemoryGateway, PlayerIdentity, SettlementGateway};
pub use reward::{RewardCalculator, SettlementResult};
pub use session::{GameSession, SessionEvent, SessionId, SessionService, SessionStatus};
