use crate::amount::Multiplier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Supported game variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    Matching,
    ReflexTap,
    SequentialRecall,
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVariant::Matching => write!(f, "matching"),
            GameVariant::ReflexTap => write!(f, "reflex_tap"),
            GameVariant::SequentialRecall => write!(f, "sequential_recall"),
        }
    }
}

/// Side length of the matching grid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum GridSize {
    Two,
    Four,
    Six,
}

impl GridSize {
    pub fn side(self) -> u8 {
        match self {
            GridSize::Two => 2,
            GridSize::Four => 4,
            GridSize::Six => 6,
        }
    }

    /// `side² / 2`
    pub fn total_pairs(self) -> u32 {
        let side = self.side() as u32;
        side * side / 2
    }
}

impl TryFrom<u8> for GridSize {
    type Error = String;

    fn try_from(side: u8) -> Result<Self, Self::Error> {
        match side {
            2 => Ok(GridSize::Two),
            4 => Ok(GridSize::Four),
            6 => Ok(GridSize::Six),
            other => Err(format!("unsupported grid size {}", other)),
        }
    }
}

impl From<GridSize> for u8 {
    fn from(size: GridSize) -> u8 {
        size.side()
    }
}

/// Round length of the reflex-tap game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub enum TapDuration {
    Fifteen,
    Thirty,
    Sixty,
}

impl TapDuration {
    pub fn secs(self) -> u32 {
        match self {
            TapDuration::Fifteen => 15,
            TapDuration::Thirty => 30,
            TapDuration::Sixty => 60,
        }
    }
}

impl TryFrom<u32> for TapDuration {
    type Error = String;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        match secs {
            15 => Ok(TapDuration::Fifteen),
            30 => Ok(TapDuration::Thirty),
            60 => Ok(TapDuration::Sixty),
            other => Err(format!("unsupported round duration {}s", other)),
        }
    }
}

impl From<TapDuration> for u32 {
    fn from(duration: TapDuration) -> u32 {
        duration.secs()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// The player's pick, before the balancing tables are applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum VariantConfig {
    Matching { grid_size: GridSize },
    ReflexTap { duration: TapDuration },
    SequentialRecall { difficulty: Difficulty },
}

impl VariantConfig {
    pub fn variant(&self) -> GameVariant {
        match self {
            VariantConfig::Matching { .. } => GameVariant::Matching,
            VariantConfig::ReflexTap { .. } => GameVariant::ReflexTap,
            VariantConfig::SequentialRecall { .. } => GameVariant::SequentialRecall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRules {
    pub grid_size: GridSize,
    pub total_pairs: u32,
    /// Pair attempts allowed, matched or not
    pub max_flips: u32,
    pub multiplier: Multiplier,
    pub mismatch_hide: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflexRules {
    pub duration_secs: u32,
    pub multiplier: Multiplier,
    pub points_per_hit: u64,
    pub penalty_per_miss: u64,
    /// Score per second treated as a perfect run
    pub max_score_per_second: u64,
    pub board_size: usize,
}

impl ReflexRules {
    pub fn max_possible_score(&self) -> u64 {
        self.duration_secs as u64 * self.max_score_per_second
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallRules {
    pub difficulty: Difficulty,
    pub signal_display: Duration,
    pub reveal_gap: Duration,
    pub base_input_secs: f64,
    pub per_signal_secs: f64,
    pub multiplier: Multiplier,
    pub target_level: u32,
    pub sequence_length: usize,
    pub symbols: u32,
}

impl RecallRules {
    /// Input window for the round that ends with sequence length `level + 1`:
    /// `base + per_signal × (level + 1)^0.7`. A window that is not a
    /// representable duration (negative, NaN, overflowing) is zero.
    pub fn input_window(&self, level: u32) -> Duration {
        let length = (level + 1) as f64;
        let secs = self.base_input_secs + self.per_signal_secs * length.powf(0.7);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// Fully resolved parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum VariantRules {
    Matching(MatchingRules),
    ReflexTap(ReflexRules),
    SequentialRecall(RecallRules),
}

impl VariantRules {
    pub fn variant(&self) -> GameVariant {
        match self {
            VariantRules::Matching(_) => GameVariant::Matching,
            VariantRules::ReflexTap(_) => GameVariant::ReflexTap,
            VariantRules::SequentialRecall(_) => GameVariant::SequentialRecall,
        }
    }

    pub fn multiplier(&self) -> Multiplier {
        match self {
            VariantRules::Matching(rules) => rules.multiplier,
            VariantRules::ReflexTap(rules) => rules.multiplier,
            VariantRules::SequentialRecall(rules) => rules.multiplier,
        }
    }
}

/// Player action routed to the active rule module
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "value", rename_all = "lowercase")]
pub enum GameInput {
    /// Card index on the matching board
    Flip(usize),
    /// Digit pressed in the reflex game
    Tap(u8),
    /// Signal pressed in the recall game
    Signal(u32),
}

/// What an accepted input did
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputEffect {
    CardRevealed,
    PairMatched,
    PairMismatched,
    Hit,
    Miss,
    SignalAccepted,
    RoundCleared,
    RoundFailed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Idle,
    Playing,
    Showing,
    Input,
    Completed,
}

/// Why a recall run ended early
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RecallFailure {
    WrongSymbol { expected: u32, got: u32 },
    Timeout,
}

/// A card as the player sees it. The symbol is masked while face down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub face_up: bool,
    pub matched: bool,
    pub symbol_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingProgress {
    pub phase: GamePhase,
    pub correct_pairs: u32,
    pub wrong_pairs: u32,
    pub total_pairs: u32,
    pub flips_left: u32,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflexProgress {
    pub phase: GamePhase,
    pub score: u64,
    pub hits: u32,
    pub misses: u32,
    pub hit_target: u8,
    pub board: Vec<u8>,
    pub time_remaining_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallProgress {
    pub phase: GamePhase,
    /// Rounds cleared so far (the score)
    pub level: u32,
    pub current_length: u32,
    pub completed_inputs: u32,
    /// Newest symbol, only while it is on display
    pub showing: Option<u32>,
    pub input_time_remaining_ms: u64,
    pub failure: Option<RecallFailure>,
}

/// Snapshot of a rule module's accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum GameProgress {
    Matching(MatchingProgress),
    ReflexTap(ReflexProgress),
    SequentialRecall(RecallProgress),
}

impl GameProgress {
    /// Counter that only ever moves forward during play: resolved pair
    /// attempts, resolved taps, or cleared rounds.
    pub fn milestone(&self) -> u64 {
        match self {
            GameProgress::Matching(p) => (p.correct_pairs + p.wrong_pairs) as u64,
            GameProgress::ReflexTap(p) => (p.hits + p.misses) as u64,
            GameProgress::SequentialRecall(p) => p.level as u64,
        }
    }

    pub fn phase(&self) -> GamePhase {
        match self {
            GameProgress::Matching(p) => p.phase,
            GameProgress::ReflexTap(p) => p.phase,
            GameProgress::SequentialRecall(p) => p.phase,
        }
    }
}

/// Rejected player action. Never escalates beyond the rule module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("game is not accepting input in phase {0:?}")]
    NotAccepting(GamePhase),

    #[error("flip budget exhausted")]
    FlipBudgetExhausted,

    #[error("card {0} does not exist")]
    CardOutOfRange(usize),

    #[error("card {0} is already face-up or matched")]
    CardUnavailable(usize),

    #[error("mismatched pair is still on display")]
    BoardBusy,

    #[error("digit {0} is not in 0-9")]
    InvalidDigit(u8),

    #[error("signal {signal} is not in 0-{max}")]
    InvalidSignal { signal: u32, max: u32 },

    #[error("{input:?} is not an input for {variant}")]
    WrongInputKind { variant: GameVariant, input: GameInput },
}
