//! arcade-sim - plays scripted wagering sessions against an in-process escrow
//!
//! Every run stakes from a funded test wallet, plays one or more games with a
//! deterministic bot, settles, withdraws, and resets the machine.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wager_arcade::{
    config::generate_sample_config,
    games::{CardView, Difficulty, GamePhase, GridSize, InputEffect, TapDuration, VariantRules},
    session::spawn_ticker,
    Amount, ArcadeResult, ConfigLoader, GameInput, GameProgress, InMemoryGateway,
    PlayerIdentity, SessionError, SessionService, SessionStatus, VariantConfig,
};

const DEFAULT_IDENTITY: &str = "0xa11ce";

type Service = SessionService<InMemoryGateway>;

#[derive(Parser)]
#[command(name = "arcade-sim")]
#[command(about = "Wager Arcade session simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Drive game timers from the wall clock instead of a simulated one
    #[arg(long)]
    realtime: bool,

    /// Starting wallet balance in whole tokens
    #[arg(long, default_value = "1000")]
    wallet: i64,

    /// Starting prize pool in whole tokens
    #[arg(long, default_value = "10000")]
    prize_pool: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a matching game, clearing `pairs` pairs before missing on purpose
    Matching {
        #[arg(short, long, default_value = "4", value_parser = parse_grid)]
        grid: GridSize,
        #[arg(short, long, default_value = "5")]
        stake: Amount,
        #[arg(short, long, default_value = "4")]
        pairs: u32,
    },
    /// Play a reflex game with a fixed number of hits and misses
    Reflex {
        #[arg(short, long, default_value = "30", value_parser = parse_duration)]
        duration: TapDuration,
        #[arg(short, long, default_value = "1")]
        stake: Amount,
        #[arg(long, default_value = "9")]
        hits: u32,
        #[arg(long, default_value = "0")]
        misses: u32,
    },
    /// Play a recall game, clearing `rounds` rounds before failing
    Recall {
        #[arg(short, long, default_value = "medium", value_parser = parse_difficulty)]
        difficulty: Difficulty,
        #[arg(short, long, default_value = "5")]
        stake: Amount,
        #[arg(short, long, default_value = "12")]
        rounds: u32,
    },
    /// Play one scripted session of every variant
    Demo,
    /// Write a sample configuration file
    GenerateConfig {
        #[arg(default_value = "arcade.toml")]
        path: PathBuf,
    },
}

/// A scripted session: what to stake on and how the bot should play.
struct Play {
    stake: Amount,
    choice: VariantConfig,
    bot: Bot,
}

enum Bot {
    Matching { pairs: u32 },
    Reflex { hits: u32, misses: u32 },
    Recall { rounds: u32 },
}

fn parse_grid(s: &str) -> Result<GridSize, String> {
    s.parse::<u8>().map_err(|e| e.to_string())?.try_into()
}

fn parse_duration(s: &str) -> Result<TapDuration, String> {
    s.parse::<u32>().map_err(|e| e.to_string())?.try_into()
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    match s.to_ascii_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(format!("unknown difficulty '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> ArcadeResult<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wager_arcade=debug,arcade_sim=debug"
    } else {
        "wager_arcade=info,arcade_sim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let plays = match cli.command {
        Commands::GenerateConfig { path } => {
            generate_sample_config(&path.to_string_lossy())?;
            info!(path = %path.display(), "sample configuration written");
            return Ok(());
        }
        Commands::Matching { grid, stake, pairs } => vec![Play {
            stake,
            choice: VariantConfig::Matching { grid_size: grid },
            bot: Bot::Matching { pairs },
        }],
        Commands::Reflex {
            duration,
            stake,
            hits,
            misses,
        } => vec![Play {
            stake,
            choice: VariantConfig::ReflexTap { duration },
            bot: Bot::Reflex { hits, misses },
        }],
        Commands::Recall {
            difficulty,
            stake,
            rounds,
        } => vec![Play {
            stake,
            choice: VariantConfig::SequentialRecall { difficulty },
            bot: Bot::Recall { rounds },
        }],
        Commands::Demo => demo_plays(),
    };

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let player = PlayerIdentity::new(
        config
            .engine
            .identity
            .clone()
            .unwrap_or_else(|| DEFAULT_IDENTITY.to_string()),
    );
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.fund_wallet(&player, Amount::from_whole(cli.wallet));
    gateway.fund_prize_pool(Amount::from_whole(cli.prize_pool));

    let service = Arc::new(SessionService::new(gateway.clone(), config));
    service.bind_identity(player.clone()).await;
    let logger = spawn_event_logger(&service);

    for play in plays {
        run_play(&service, play, cli.realtime).await?;
    }

    info!(
        player = %player,
        wallet = %gateway.wallet_balance(&player),
        prize_pool = %gateway.prize_pool(),
        transactions = gateway.transaction_count(),
        "simulation finished"
    );
    logger.abort();
    Ok(())
}

fn demo_plays() -> Vec<Play> {
    vec![
        Play {
            stake: Amount::from_whole(5),
            choice: VariantConfig::Matching {
                grid_size: GridSize::Four,
            },
            bot: Bot::Matching { pairs: 4 },
        },
        Play {
            stake: Amount::from_whole(1),
            choice: VariantConfig::ReflexTap {
                duration: TapDuration::Thirty,
            },
            bot: Bot::Reflex { hits: 9, misses: 0 },
        },
        Play {
            stake: Amount::from_whole(5),
            choice: VariantConfig::SequentialRecall {
                difficulty: Difficulty::Medium,
            },
            bot: Bot::Recall { rounds: 12 },
        },
    ]
}

fn spawn_event_logger(service: &Service) -> JoinHandle<()> {
    let mut rx = service.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_else(|e| e.to_string());
                    debug!(session_id = %event.session_id(), event = %json, "session event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run_play(service: &Arc<Service>, play: Play, realtime: bool) -> ArcadeResult<()> {
    let max_reward = service.max_reward(play.stake, &play.choice)?;
    info!(
        variant = %play.choice.variant(),
        stake = %play.stake,
        max_reward = %max_reward,
        "starting session"
    );

    let session_id = service.start_session(play.stake, play.choice).await?;
    let clock = Clock::start(service, realtime).await;

    let session = service
        .snapshot()
        .await
        .ok_or(SessionError::UnknownSession(session_id))?;
    if let Some(commitment) = &session.seed_commitment {
        debug!(session_id = %session_id, %commitment, "seed committed");
    }

    match (play.bot, &session.rules) {
        (Bot::Matching { pairs }, VariantRules::Matching(rules)) => {
            play_matching(service, &clock, pairs, rules.mismatch_hide).await?;
        }
        (Bot::Reflex { hits, misses }, VariantRules::ReflexTap(rules)) => {
            play_reflex(service, &clock, hits, misses, rules.duration_secs).await?;
        }
        (Bot::Recall { rounds }, VariantRules::SequentialRecall(rules)) => {
            play_recall(service, &clock, rounds, rules.symbols).await?;
        }
        (_, rules) => {
            warn!(variant = %rules.variant(), "no bot for resolved rules");
        }
    }
    clock.stop();

    let session = service
        .snapshot()
        .await
        .ok_or(SessionError::UnknownSession(session_id))?;
    if let Some(result) = &session.settlement {
        info!(
            session_id = %session_id,
            earned = %result.earned_amount,
            net_gain = %result.net_gain,
            performance = result.performance.as_f64(),
            seed = ?session.seed,
            "session settled"
        );
        println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_else(|e| e.to_string())
        );
    }
    if let Some(reason) = &session.failure_reason {
        info!(session_id = %session_id, reason = %reason, "game ended early");
    }

    if service.status().await == SessionStatus::AwaitingSettlement {
        let receipt = service.withdraw().await?;
        info!(
            session_id = %session_id,
            tx_hash = %receipt.tx_hash,
            amount = %receipt.amount,
            "payout withdrawn"
        );
    }

    service.reset().await?;
    Ok(())
}

/// Source of elapsed time for the running game.
enum Clock {
    /// Feeds fixed steps through manual ticks; no real waiting.
    Simulated { step: Duration },
    /// A background ticker advances timers; the bot sleeps.
    Realtime { ticker: Option<JoinHandle<()>> },
}

impl Clock {
    async fn start(service: &Arc<Service>, realtime: bool) -> Self {
        if realtime {
            Clock::Realtime {
                ticker: spawn_ticker(service.clone()).await,
            }
        } else {
            Clock::Simulated {
                step: service.tick_interval(),
            }
        }
    }

    async fn advance(&self, service: &Service, by: Duration) -> Result<(), SessionError> {
        match self {
            Clock::Simulated { step } => {
                let mut left = by;
                while !left.is_zero() {
                    let Some(token) = service.tick_token().await else {
                        break;
                    };
                    let dt = left.min(*step);
                    service.tick(&token, dt).await?;
                    left -= dt;
                }
            }
            // two ticks of slack so the ticker has fired before the bot moves on
            Clock::Realtime { .. } => tokio::time::sleep(by + service.tick_interval() * 2).await,
        }
        Ok(())
    }

    fn step(&self, service: &Service) -> Duration {
        match self {
            Clock::Simulated { step } => *step,
            Clock::Realtime { .. } => service.tick_interval(),
        }
    }

    fn stop(self) {
        if let Clock::Realtime { ticker: Some(handle) } = self {
            handle.abort();
        }
    }
}

async fn progress(service: &Service) -> Option<GameProgress> {
    if service.status().await != SessionStatus::Active {
        return None;
    }
    service.snapshot().await.and_then(|s| s.progress)
}

/// Plays from memory: every symbol seen face up is remembered. Takes pairs
/// until `pairs` are matched, then spends the budget on misses.
async fn play_matching(
    service: &Service,
    clock: &Clock,
    pairs: u32,
    hide: Duration,
) -> Result<(), SessionError> {
    let mut seen: HashMap<usize, u32> = HashMap::new();

    while let Some(GameProgress::Matching(p)) = progress(service).await {
        learn(&mut seen, &p.cards);
        let open: Vec<usize> = (0..p.cards.len()).filter(|&i| !p.cards[i].matched).collect();
        if open.len() < 2 {
            break;
        }
        let hunting = p.correct_pairs < pairs;

        let first = match hunting.then(|| known_pair(&seen, &open)).flatten() {
            Some((a, _)) => a,
            None => open
                .iter()
                .copied()
                .find(|i| !seen.contains_key(i))
                .unwrap_or(open[0]),
        };
        service.handle_input(GameInput::Flip(first)).await?;
        if let Some(GameProgress::Matching(p)) = progress(service).await {
            learn(&mut seen, &p.cards);
        }

        let symbol = seen.get(&first).copied();
        let seen_with = |same: bool| {
            open.iter().copied().find(|&i| {
                i != first && seen.get(&i).is_some_and(|s| (Some(*s) == symbol) == same)
            })
        };
        let unseen = open
            .iter()
            .copied()
            .find(|&i| i != first && !seen.contains_key(&i));
        let Some(second) = seen_with(hunting)
            .or(unseen)
            .or_else(|| open.iter().copied().find(|&i| i != first))
        else {
            break;
        };

        let effect = service.handle_input(GameInput::Flip(second)).await?;
        if let Some(GameProgress::Matching(p)) = progress(service).await {
            learn(&mut seen, &p.cards);
        }
        if effect == InputEffect::PairMismatched {
            clock.advance(service, hide).await?;
        }
    }
    Ok(())
}

fn learn(seen: &mut HashMap<usize, u32>, cards: &[CardView]) {
    for (index, card) in cards.iter().enumerate() {
        if let Some(symbol) = card.symbol_id {
            seen.insert(index, symbol);
        }
    }
}

fn known_pair(seen: &HashMap<usize, u32>, open: &[usize]) -> Option<(usize, usize)> {
    open.iter().enumerate().find_map(|(n, &a)| {
        let symbol = seen.get(&a)?;
        open[n + 1..]
            .iter()
            .copied()
            .find(|b| seen.get(b) == Some(symbol))
            .map(|b| (a, b))
    })
}

async fn play_reflex(
    service: &Service,
    clock: &Clock,
    hits: u32,
    misses: u32,
    duration_secs: u32,
) -> Result<(), SessionError> {
    for _ in 0..hits {
        let Some(GameProgress::ReflexTap(p)) = progress(service).await else {
            break;
        };
        service.handle_input(GameInput::Tap(p.hit_target)).await?;
    }
    for _ in 0..misses {
        let Some(GameProgress::ReflexTap(p)) = progress(service).await else {
            break;
        };
        service
            .handle_input(GameInput::Tap((p.hit_target + 1) % 10))
            .await?;
    }

    clock
        .advance(service, Duration::from_secs(duration_secs as u64 + 1))
        .await
}

/// Memorises each symbol while it is displayed and replays the sequence,
/// failing on purpose once `rounds` rounds are cleared.
async fn play_recall(
    service: &Service,
    clock: &Clock,
    rounds: u32,
    symbols: u32,
) -> Result<(), SessionError> {
    let mut sequence: Vec<u32> = Vec::new();

    while let Some(GameProgress::SequentialRecall(p)) = progress(service).await {
        match p.phase {
            GamePhase::Showing => {
                if let Some(symbol) = p.showing {
                    if sequence.len() == p.level as usize {
                        sequence.push(symbol);
                    }
                }
                clock.advance(service, clock.step(service)).await?;
            }
            GamePhase::Input if p.level < rounds => {
                let range = p.completed_inputs as usize..p.current_length as usize;
                match sequence.get(range) {
                    Some(signals) => {
                        for &signal in signals {
                            service.handle_input(GameInput::Signal(signal)).await?;
                        }
                    }
                    None => {
                        warn!(level = p.level, "symbol missed, waiting out the round");
                        clock.advance(service, clock.step(service)).await?;
                    }
                }
            }
            GamePhase::Input => {
                let expected = sequence.get(p.completed_inputs as usize).copied().unwrap_or(0);
                service
                    .handle_input(GameInput::Signal((expected + 1) % symbols.max(2)))
                    .await?;
            }
            _ => break,
        }
    }
    Ok(())
}
