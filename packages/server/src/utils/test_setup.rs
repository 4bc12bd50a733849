use dotenvy::dotenv;
use std::sync::{Arc, Once};

use crate::models::{
    game::{Game, GamePhase, GameStatus},
    player::Player,
    role::Role,
    settings::GameSettings,
};
use crate::services::game_repository::InMemoryGameRepository;
use crate::services::scheduler::ManualTimer;
use crate::state::AppState;
use crate::utils::clock::ManualClock;
use crate::utils::config::Config;
use crate::utils::random::SeededRandom;

static INIT: Once = Once::new();

pub fn setup_test_env() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// "1".."n"のプレイヤー（名前は"Player1".."PlayerN"、役職なし）
pub fn roster(n: usize) -> Vec<Player> {
    (1..=n)
        .map(|i| Player::new(i.to_string(), format!("Player{i}")))
        .collect()
}

/// 1日目の議論中のゲーム。プレイヤー`i + 1`が`roles[i]`を持つ
pub fn game_with_roles(roles: &[Role]) -> Game {
    let players = roster(roles.len())
        .into_iter()
        .zip(roles)
        .map(|(mut player, role)| {
            player.role = Some(*role);
            player
        })
        .collect();
    let mut game = Game::new("test-game".to_string(), players, GameSettings::default());
    game.status = GameStatus::InProgress;
    game.current_phase = Some(GamePhase::DayDiscussion);
    game.current_day = 1;
    game
}

/// 手動タイマーと時計を使うテスト用の状態。フェーズの終了はテストが決める
pub struct TestHarness {
    pub state: AppState,
    pub timer: Arc<ManualTimer>,
    pub clock: Arc<ManualClock>,
}

pub fn test_state(seed: u64) -> TestHarness {
    test_state_with_config(seed, Config::default())
}

pub fn test_state_with_config(seed: u64, config: Config) -> TestHarness {
    setup_test_env();
    let timer = Arc::new(ManualTimer::new());
    let clock = Arc::new(ManualClock::default());
    let state = AppState::with_services(
        config,
        Arc::new(InMemoryGameRepository::new()),
        timer.clone(),
        clock.clone(),
        Arc::new(SeededRandom::new(seed)),
    );
    TestHarness {
        state,
        timer,
        clock,
    }
}
