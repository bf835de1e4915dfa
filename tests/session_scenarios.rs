//! End-to-end session scenarios against the in-process gateway.
//! Each test drives a full stake, play, settle, withdraw cycle.

use std::sync::Arc;
use std::time::Duration;
use wager_arcade::fairness::{verify_seed, FixedSeedSource};
use wager_arcade::games::{
    Difficulty, GamePhase, GridSize, InputEffect, MatchingGame, RecallProgress, TapDuration,
    VariantRules,
};
use wager_arcade::gateway::TxBehavior;
use wager_arcade::{
    Amount, ConfigBuilder, GameInput, GameProgress, InMemoryGateway, PlayerIdentity,
    SessionError, SessionEvent, SessionService, SessionStatus, VariantConfig,
};

const PLAYER: &str = "0xplayer";
const HOUSE_SEED: u64 = 0x5eed;

fn player() -> PlayerIdentity {
    PlayerIdentity::new(PLAYER)
}

fn amount(s: &str) -> Amount {
    s.parse().expect("Failed to parse amount")
}

fn gateway() -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.fund_wallet(&player(), Amount::from_whole(100));
    gateway.fund_prize_pool(Amount::from_whole(100));
    gateway
}

fn config() -> wager_arcade::ArcadeConfig {
    ConfigBuilder::new()
        .confirmation(200, 5)
        .identity(PLAYER)
        .build()
        .expect("Failed to build config")
}

fn setup() -> SessionService<InMemoryGateway> {
    SessionService::new(gateway(), config())
}

/// Service whose seeds are pinned by the house, so a test can lay out the
/// board the way the operator would see it.
fn setup_pinned() -> SessionService<InMemoryGateway> {
    SessionService::with_seed_source(gateway(), config(), Arc::new(FixedSeedSource(HOUSE_SEED)))
}

/// Feeds `total` of simulated time through 100ms ticks.
async fn advance(svc: &SessionService<InMemoryGateway>, total: Duration) {
    let step = Duration::from_millis(100);
    let mut left = total;
    while !left.is_zero() {
        let Some(token) = svc.tick_token().await else {
            return;
        };
        let dt = left.min(step);
        svc.tick(&token, dt).await.expect("Failed to tick");
        left -= dt;
    }
}

/// Card symbols as dealt by the pinned house seed.
async fn dealt_board(svc: &SessionService<InMemoryGateway>) -> Vec<u32> {
    let session = svc.snapshot().await.expect("No session");
    let rules = match session.rules {
        VariantRules::Matching(rules) => rules,
        other => panic!("expected matching rules, got {:?}", other),
    };
    let mut board = MatchingGame::new(rules, HOUSE_SEED);
    board.activate();
    board.cards().iter().map(|c| c.symbol_id).collect()
}

fn positions(board: &[u32], symbol: u32) -> Vec<usize> {
    board
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == symbol)
        .map(|(i, _)| i)
        .collect()
}

async fn recall_progress(svc: &SessionService<InMemoryGateway>) -> RecallProgress {
    match svc.snapshot().await.and_then(|s| s.progress) {
        Some(GameProgress::SequentialRecall(p)) => p,
        other => panic!("expected recall progress, got {:?}", other),
    }
}

/// Ticks through the showing phase, noting each symbol while it is lit.
async fn advance_until_input(svc: &SessionService<InMemoryGateway>, sequence: &mut Vec<u32>) {
    for _ in 0..100 {
        let p = recall_progress(svc).await;
        if p.phase == GamePhase::Input {
            return;
        }
        if let Some(symbol) = p.showing {
            if sequence.len() == p.level as usize {
                sequence.push(symbol);
            }
        }
        advance(svc, Duration::from_millis(100)).await;
    }
    panic!("recall never reached the input phase");
}

#[tokio::test]
async fn test_matching_half_board_pays_three_seventy_five() {
    let svc = setup_pinned();
    let stake = Amount::from_whole(5);
    svc.start_session(
        stake,
        VariantConfig::Matching {
            grid_size: GridSize::Four,
        },
    )
    .await
    .expect("Failed to start session");

    let board = dealt_board(&svc).await;
    assert_eq!(board.len(), 16);

    // === Four correct pairs ===
    for symbol in 0..4 {
        for index in positions(&board, symbol) {
            svc.handle_input(GameInput::Flip(index)).await.unwrap();
        }
    }

    // === Burn the remaining ten attempts on misses ===
    let a = positions(&board, 4)[0];
    let b = positions(&board, 5)[0];
    for _ in 0..10 {
        assert_eq!(svc.status().await, SessionStatus::Active);
        svc.handle_input(GameInput::Flip(a)).await.unwrap();
        svc.handle_input(GameInput::Flip(b)).await.unwrap();
        advance(&svc, Duration::from_millis(1000)).await;
    }

    let session = svc.snapshot().await.unwrap();
    assert_eq!(session.status, SessionStatus::AwaitingSettlement);
    let result = session.settlement.expect("No settlement");
    assert_eq!(result.earned_amount, amount("3.75"));
    assert_eq!(result.net_gain, amount("-1.25"));

    let receipt = svc.withdraw().await.expect("Failed to withdraw");
    assert_eq!(receipt.amount, amount("3.75"));
    assert_eq!(svc.status().await, SessionStatus::Completed);
    assert_eq!(svc.gateway().wallet_balance(&player()), amount("98.75"));
}

#[tokio::test]
async fn test_reflex_half_ceiling_pays_point_eight() {
    let svc = setup();
    svc.start_session(
        Amount::from_whole(1),
        VariantConfig::ReflexTap {
            duration: TapDuration::Thirty,
        },
    )
    .await
    .unwrap();

    for _ in 0..9 {
        let target = match svc.snapshot().await.and_then(|s| s.progress) {
            Some(GameProgress::ReflexTap(p)) => p.hit_target,
            other => panic!("expected reflex progress, got {:?}", other),
        };
        svc.handle_input(GameInput::Tap(target)).await.unwrap();
    }
    match svc.snapshot().await.and_then(|s| s.progress) {
        Some(GameProgress::ReflexTap(p)) => assert_eq!(p.score, 90),
        other => panic!("expected reflex progress, got {:?}", other),
    }

    advance(&svc, Duration::from_secs(30)).await;
    let result = svc.snapshot().await.unwrap().settlement.unwrap();
    assert_eq!(result.earned_amount, amount("0.8"));
    assert_eq!(svc.status().await, SessionStatus::AwaitingSettlement);
}

#[tokio::test]
async fn test_recall_beyond_target_is_capped_at_full_multiplier() {
    let svc = setup();
    let stake = Amount::from_whole(5);
    svc.start_session(
        stake,
        VariantConfig::SequentialRecall {
            difficulty: Difficulty::Medium,
        },
    )
    .await
    .unwrap();
    let symbols = match svc.snapshot().await.unwrap().rules {
        VariantRules::SequentialRecall(rules) => rules.symbols,
        other => panic!("expected recall rules, got {:?}", other),
    };

    // target is 12; clear one round more
    let mut sequence = Vec::new();
    for round in 1..=13usize {
        advance_until_input(&svc, &mut sequence).await;
        assert_eq!(sequence.len(), round);
        for &signal in &sequence[..round] {
            svc.handle_input(GameInput::Signal(signal)).await.unwrap();
        }
    }
    assert_eq!(recall_progress(&svc).await.level, 13);

    // fail round fourteen
    advance_until_input(&svc, &mut sequence).await;
    let wrong = (sequence[0] + 1) % symbols;
    svc.handle_input(GameInput::Signal(wrong)).await.unwrap();

    let session = svc.snapshot().await.unwrap();
    let result = session.settlement.unwrap();
    assert_eq!(result.performance.achieved, 13);
    assert!(result.performance.is_full());
    assert_eq!(result.earned_amount, Amount::from_whole(8));
    assert_eq!(result.net_gain, Amount::from_whole(3));
    assert!(session.failure_reason.is_some());

    svc.withdraw().await.unwrap();
    assert_eq!(svc.gateway().wallet_balance(&player()), Amount::from_whole(103));
    assert_eq!(svc.gateway().prize_pool(), Amount::from_whole(97));
}

#[tokio::test]
async fn test_recall_first_round_failure_forfeits_stake() {
    let svc = setup();
    svc.start_session(
        Amount::from_whole(5),
        VariantConfig::SequentialRecall {
            difficulty: Difficulty::Medium,
        },
    )
    .await
    .unwrap();

    // let the first input window run out
    advance_until_input(&svc, &mut Vec::new()).await;
    advance(&svc, Duration::from_secs(10)).await;

    let session = svc.snapshot().await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    let result = session.settlement.unwrap();
    assert!(result.earned_amount.is_zero());
    assert_eq!(result.net_gain, Amount::from_whole(-5));
    assert_eq!(svc.withdraw().await, Err(SessionError::NothingToWithdraw));
    assert_eq!(svc.gateway().transaction_count(), 1);

    svc.reset().await.unwrap();
    assert_eq!(svc.status().await, SessionStatus::Idle);
}

async fn settle_reflex(svc: &SessionService<InMemoryGateway>) -> Amount {
    svc.start_session(
        Amount::from_whole(1),
        VariantConfig::ReflexTap {
            duration: TapDuration::Fifteen,
        },
    )
    .await
    .unwrap();
    let target = match svc.snapshot().await.and_then(|s| s.progress) {
        Some(GameProgress::ReflexTap(p)) => p.hit_target,
        other => panic!("expected reflex progress, got {:?}", other),
    };
    svc.handle_input(GameInput::Tap(target)).await.unwrap();
    advance(svc, Duration::from_secs(15)).await;
    svc.snapshot().await.unwrap().settlement.unwrap().earned_amount
}

#[tokio::test]
async fn test_concurrent_withdraws_pay_once() {
    let svc = setup();
    let earned = settle_reflex(&svc).await;
    assert!(earned.is_positive());
    let before = svc.gateway().wallet_balance(&player());

    let (first, second) = tokio::join!(svc.withdraw(), svc.withdraw());
    let (ok, err) = match (first, second) {
        (Ok(receipt), Err(e)) | (Err(e), Ok(receipt)) => (receipt, e),
        other => panic!("expected exactly one payout, got {:?}", other),
    };
    assert_eq!(ok.amount, earned);
    assert!(matches!(
        err,
        SessionError::WithdrawInFlight { .. } | SessionError::NothingToWithdraw
    ));
    assert_eq!(svc.gateway().wallet_balance(&player()), before + earned);
    assert_eq!(svc.gateway().transaction_count(), 2);
}

#[tokio::test]
async fn test_stalled_withdraw_blocks_second_attempt() {
    let svc = setup();
    let earned = settle_reflex(&svc).await;
    let before = svc.gateway().wallet_balance(&player());

    svc.gateway().script_next(TxBehavior::StayPending);
    let tx_hash = match svc.withdraw().await {
        Err(SessionError::ConfirmationPending { tx_hash }) => tx_hash,
        other => panic!("expected pending confirmation, got {:?}", other),
    };
    assert_eq!(svc.status().await, SessionStatus::AwaitingSettlement);
    assert_eq!(
        svc.withdraw().await,
        Err(SessionError::WithdrawInFlight {
            tx_hash: Some(tx_hash.clone())
        })
    );
    assert!(matches!(
        svc.reset().await,
        Err(SessionError::InvalidTransition { .. })
    ));

    svc.gateway().force_confirm(&tx_hash).unwrap();
    let receipt = svc.resume_withdraw().await.unwrap();
    assert_eq!(receipt.tx_hash, tx_hash);
    assert_eq!(svc.status().await, SessionStatus::Completed);
    assert_eq!(svc.gateway().wallet_balance(&player()), before + earned);
    assert_eq!(svc.withdraw().await, Err(SessionError::NothingToWithdraw));
}

#[tokio::test]
async fn test_failed_withdraw_can_be_retried() {
    let svc = setup();
    let earned = settle_reflex(&svc).await;

    svc.gateway().script_next(TxBehavior::Revert("out of gas".to_string()));
    assert_eq!(
        svc.withdraw().await,
        Err(SessionError::WithdrawFailed("out of gas".to_string()))
    );
    assert_eq!(svc.status().await, SessionStatus::AwaitingSettlement);

    let receipt = svc.withdraw().await.unwrap();
    assert_eq!(receipt.amount, earned);
    assert_eq!(svc.status().await, SessionStatus::Completed);
}

#[tokio::test]
async fn test_stale_tick_token_is_ignored() {
    let svc = setup();
    let choice = VariantConfig::ReflexTap {
        duration: TapDuration::Fifteen,
    };
    svc.start_session(Amount::from_whole(1), choice).await.unwrap();
    let old = svc.tick_token().await.unwrap();
    advance(&svc, Duration::from_secs(15)).await;
    svc.withdraw().await.ok();
    svc.reset().await.unwrap();

    svc.start_session(Amount::from_whole(1), choice).await.unwrap();
    assert!(!svc.tick(&old, Duration::from_secs(60)).await.unwrap());
    assert_eq!(svc.status().await, SessionStatus::Active);
    match svc.snapshot().await.and_then(|s| s.progress) {
        Some(GameProgress::ReflexTap(p)) => assert_eq!(p.time_remaining_secs, 15),
        other => panic!("expected reflex progress, got {:?}", other),
    }
}

#[tokio::test]
async fn test_guards_before_any_transaction() {
    let svc = setup();
    let choice = VariantConfig::ReflexTap {
        duration: TapDuration::Fifteen,
    };

    assert!(matches!(
        svc.start_session(Amount::ZERO, choice).await,
        Err(SessionError::InvalidStake { .. })
    ));
    assert!(matches!(
        svc.start_session(amount("0.00005"), choice).await,
        Err(SessionError::InvalidStake { .. })
    ));
    svc.unbind_identity().await;
    assert_eq!(
        svc.start_session(Amount::from_whole(1), choice).await,
        Err(SessionError::WalletNotConnected)
    );
    assert_eq!(svc.gateway().transaction_count(), 0);
    assert_eq!(svc.withdraw().await, Err(SessionError::NothingToWithdraw));
}

#[tokio::test]
async fn test_event_stream_tracks_full_lifecycle() {
    let svc = setup();
    let mut events = svc.subscribe();
    settle_reflex(&svc).await;
    svc.withdraw().await.unwrap();

    let mut statuses = Vec::new();
    let mut withdrawn = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::StatusChanged { to, .. } => statuses.push(to),
            SessionEvent::Withdrawn { .. } => withdrawn = true,
            _ => {}
        }
    }
    assert!(withdrawn);
    assert_eq!(
        statuses,
        vec![
            SessionStatus::AwaitingDeposit,
            SessionStatus::Active,
            SessionStatus::AwaitingSettlement,
            SessionStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_play_time_snapshot_hides_the_deal() {
    let svc = setup();
    let id = svc
        .start_session(
            Amount::from_whole(10),
            VariantConfig::Matching {
                grid_size: GridSize::Six,
            },
        )
        .await
        .unwrap();

    // === During play: commitment only, every card masked ===
    let session = svc.snapshot().await.unwrap();
    assert!(session.seed.is_none());
    let commitment = session.seed_commitment.clone().expect("No commitment");
    let cards = match &session.progress {
        Some(GameProgress::Matching(p)) => p.cards.clone(),
        other => panic!("expected matching progress, got {:?}", other),
    };
    assert_eq!(cards.len(), 36);
    assert!(cards.iter().all(|c| c.symbol_id.is_none()));

    // a flipped card shows its symbol, the rest stay hidden
    svc.handle_input(GameInput::Flip(0)).await.unwrap();
    let observed = match svc.snapshot().await.and_then(|s| s.progress) {
        Some(GameProgress::Matching(p)) => p.cards,
        other => panic!("expected matching progress, got {:?}", other),
    };
    let first_symbol = observed[0].symbol_id.expect("Flipped card should be visible");
    assert!(observed[1..].iter().all(|c| c.symbol_id.is_none()));

    // === After the game: seed revealed and checkable ===
    while svc.status().await == SessionStatus::Active {
        let cards = match svc.snapshot().await.and_then(|s| s.progress) {
            Some(GameProgress::Matching(p)) => p.cards,
            _ => break,
        };
        let Some(pick) = cards.iter().position(|c| !c.face_up && !c.matched) else {
            break;
        };
        let effect = svc.handle_input(GameInput::Flip(pick)).await.unwrap();
        if effect == InputEffect::PairMismatched {
            advance(&svc, Duration::from_millis(1000)).await;
        }
    }

    let session = svc.snapshot().await.unwrap();
    assert!(session.settlement.is_some());
    let seed = session.seed.expect("Seed should be revealed after play");
    assert!(verify_seed(&id, seed, &commitment));

    let rules = match session.rules {
        VariantRules::Matching(rules) => rules,
        other => panic!("expected matching rules, got {:?}", other),
    };
    let mut replay = MatchingGame::new(rules, seed);
    replay.activate();
    assert_eq!(replay.cards()[0].symbol_id, first_symbol);
}
