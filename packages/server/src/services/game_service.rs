use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::time::Duration;

use crate::models::{
    action::{ActionKind, ActionRecord},
    chat::SystemMessage,
    game::{Game, GameEventType, GamePhase, GameStatus, PhaseStamp, Winner},
    player::Player,
    settings::{GameSettings, SettingsError},
};
use crate::services::action_service::{handle_action, ActionOutcome};
use crate::services::action_store::Tally;
use crate::services::backfill::assign_missing_actions;
use crate::services::game_repository::RepositoryError;
use crate::services::phase_resolver::{
    resolve_night_phase, resolve_vote_phase, NightOutcome, NightReport, VoteReport,
};
use crate::services::role_assignment::{assign_roles, RoleAssignmentError};
use crate::services::win_evaluator::{check_game_end, GameEndCheck};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum GameServiceError {
    #[error("Game {0} was not found")]
    GameNotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
    #[error(transparent)]
    RoleAssignment(#[from] RoleAssignmentError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn load_game(state: &AppState, game_id: &str) -> Result<Game, GameServiceError> {
    state
        .repository
        .load(game_id)?
        .ok_or_else(|| GameServiceError::GameNotFound(game_id.to_string()))
}

/// Opens a lobby for `players`. Roles are handed out when the game starts.
pub async fn create_game(
    state: &AppState,
    players: Vec<Player>,
    settings: GameSettings,
) -> Result<Game, GameServiceError> {
    settings.validate(players.len())?;
    let mut seen = HashSet::new();
    if let Some(duplicate) = players.iter().find(|p| !seen.insert(p.id.as_str())) {
        return Err(GameServiceError::InvalidState(format!(
            "Player {} joined twice",
            duplicate.id
        )));
    }

    let game_id = uuid::Uuid::new_v4().to_string();
    let game = Game::new(game_id.clone(), players, settings);
    state.repository.save(&game)?;
    info!("Game {} created with {} players", game_id, game.players.len());
    Ok(game)
}

pub async fn start_game(state: &AppState, game_id: &str) -> Result<Game, GameServiceError> {
    let _guard = state.lock_game(game_id).await;
    let mut game = load_game(state, game_id)?;
    if game.status != GameStatus::Waiting {
        return Err(GameServiceError::InvalidState(format!(
            "Game {game_id} has already started"
        )));
    }
    game.settings.validate(game.players.len())?;

    game.players = assign_roles(&game.players, &game.settings, state.rng.as_ref())?;
    game.status = GameStatus::InProgress;
    let now = state.clock.now();
    enter_phase(&mut game, GamePhase::DayDiscussion, 1, now);

    state.action_store.initialize(game_id);
    state.repository.save(&game)?;
    schedule_phase_timer(state, &game);

    info!("Game {game_id} started with {} players", game.players.len());
    state
        .narrate(SystemMessage::public(
            game_id,
            format!("The game has begun. {}", phase_start_message(GamePhase::DayDiscussion, 1)),
            now,
        ))
        .await;
    Ok(game)
}

/// Validates and records one player action. Rule violations come back as an
/// unsuccessful outcome, not as an error.
pub async fn submit_action(
    state: &AppState,
    game_id: &str,
    actor_id: &str,
    target_id: &str,
    kind: ActionKind,
) -> Result<ActionOutcome, GameServiceError> {
    let _guard = state.lock_game(game_id).await;
    let game = load_game(state, game_id)?;
    let result = handle_action(&game, &state.action_store, kind, actor_id, target_id);
    if let Err(rejection) = &result {
        debug!("Game {game_id}: {kind} from {actor_id} rejected: {rejection}");
    }
    Ok(ActionOutcome::from(result))
}

/// Ends the current phase right away, as if its timer had fired.
pub async fn advance_phase(state: &AppState, game_id: &str) -> Result<Game, GameServiceError> {
    let _guard = state.lock_game(game_id).await;
    let game = load_game(state, game_id)?;
    if game.status != GameStatus::InProgress {
        return Err(GameServiceError::InvalidState(format!(
            "Game {game_id} is not in progress"
        )));
    }
    transition(state, game).await
}

/// Timer callback. Never fails: errors are logged, and a timer armed for a
/// phase the game already left does nothing.
pub async fn on_phase_timer(state: AppState, game_id: String, stamp: PhaseStamp) {
    let _guard = state.lock_game(&game_id).await;
    let game = match state.repository.load(&game_id) {
        Ok(Some(game)) => game,
        Ok(None) => {
            debug!("Phase timer fired for deleted game {game_id}");
            return;
        }
        Err(e) => {
            error!("Phase timer could not load game {game_id}: {e}");
            retry_phase_timer(&state, &game_id, stamp);
            return;
        }
    };
    if game.status != GameStatus::InProgress || game.phase_stamp() != Some(stamp) {
        debug!(
            "Stale phase timer for game {game_id} (armed for day {} {})",
            stamp.day, stamp.phase
        );
        return;
    }
    if let Err(e) = transition(&state, game).await {
        error!("Phase transition of game {game_id} failed: {e}");
        retry_phase_timer(&state, &game_id, stamp);
    }
}

fn schedule_phase_timer(state: &AppState, game: &Game) {
    if !state.config.auto_advance_phases {
        return;
    }
    let Some(stamp) = game.phase_stamp() else {
        return;
    };
    let Some(after) = game.settings.phase_duration(stamp.phase) else {
        return;
    };
    arm_phase_timer(state, &game.id, stamp, after);
}

// 発火済みのタイマーは枠を解放しているので、ここで再設定しないとフェーズが終わらない
fn retry_phase_timer(state: &AppState, game_id: &str, stamp: PhaseStamp) {
    let after = state.config.phase_retry_delay;
    warn!(
        "Retrying the end of day {} {} for game {game_id} in {after:?}",
        stamp.day, stamp.phase
    );
    arm_phase_timer(state, game_id, stamp, after);
}

fn arm_phase_timer(state: &AppState, game_id: &str, stamp: PhaseStamp, after: Duration) {
    let task_state = state.clone();
    let task_game_id = game_id.to_string();
    state.scheduler.schedule(
        game_id,
        after,
        Box::pin(async move { on_phase_timer(task_state, task_game_id, stamp).await }),
    );
}

/// Closes the current phase: fills in missing actions, resolves them, checks
/// for a winner, then either finishes the game or opens the next phase.
/// Nothing is saved if any step fails.
async fn transition(state: &AppState, mut game: Game) -> Result<Game, GameServiceError> {
    let phase = match game.current_phase {
        Some(GamePhase::GameOver) | None => {
            return Err(GameServiceError::InvalidState(format!(
                "Game {} has no phase to end",
                game.id
            )))
        }
        Some(phase) => phase,
    };
    let day = game.current_day;
    let now = state.clock.now();
    let rng = state.rng.as_ref();

    let mut actions = state.action_store.get(&game.id).unwrap_or_else(|| {
        warn!(
            "Actions of game {} were missing, resolving day {day} {phase} without them",
            game.id
        );
        state.action_store.initialize(&game.id);
        ActionRecord::default()
    });
    let backfilled = assign_missing_actions(&game, &actions, rng);
    for assignment in &backfilled {
        debug!(
            "Game {}: backfilled {} {} -> {}",
            game.id, assignment.kind, assignment.actor_id, assignment.target_id
        );
        actions.record(assignment.kind, &assignment.actor_id, &assignment.target_id);
    }

    let mut narration = vec![phase_end_message(phase, day)];
    let mut private = Vec::new();
    let ending = match phase {
        GamePhase::DayDiscussion => None,
        GamePhase::DayVote => {
            let report = resolve_vote_phase(&mut game, &actions, rng);
            narration.push(execution_message(&game, &report));
            let check = check_game_end(&game.players);
            if check.ended && check.winner == Winner::Werewolves {
                info!("Game {}: werewolves reached parity, the night is still played", game.id);
                None
            } else {
                check.ended.then_some(check)
            }
        }
        GamePhase::Night => {
            let report = resolve_night_phase(&mut game, &actions, rng);
            narration.push(night_message(&game, &report));
            for insight in report.insights.iter().filter(|insight| {
                backfilled
                    .iter()
                    .any(|a| a.kind == insight.kind && a.actor_id == insight.actor_id)
            }) {
                private.push(SystemMessage::private(
                    &game.id,
                    &insight.actor_id,
                    insight.message.clone(),
                    now,
                ));
            }
            let check = check_game_end(&game.players);
            check.ended.then_some(check)
        }
        GamePhase::GameOver => None,
    };

    match ending {
        Some(check) => {
            finish_game(&mut game, check, now);
            narration.push(winner_message(check.winner));
        }
        None => {
            let (next, next_day) = phase.next(day);
            enter_phase(&mut game, next, next_day, now);
            narration.push(phase_start_message(next, next_day));
        }
    }

    state.repository.save(&game)?;
    state
        .action_store
        .clear_kinds(&game.id, ActionKind::cleared_after(phase));
    if game.status == GameStatus::Finished {
        state.scheduler.cancel(&game.id);
        info!("Game finished: {game}");
    } else {
        schedule_phase_timer(state, &game);
        info!(
            "Game {}: day {day} {phase} ended, day {} {} begins",
            game.id,
            game.current_day,
            game.current_phase.unwrap_or(phase)
        );
    }

    for content in narration {
        state
            .narrate(SystemMessage::public(&game.id, content, now))
            .await;
    }
    for message in private {
        state.narrate(message).await;
    }
    if game.status == GameStatus::Finished {
        state.close_channel(&game.id);
    }
    Ok(game)
}

fn enter_phase(game: &mut Game, phase: GamePhase, day: u32, now: DateTime<Utc>) {
    game.current_phase = Some(phase);
    game.current_day = day;
    game.phase_end_time = game
        .settings
        .phase_duration(phase)
        .and_then(|duration| chrono::Duration::from_std(duration).ok())
        .map(|duration| now + duration);
    game.record_event(
        GameEventType::PhaseChange,
        phase_start_message(phase, day),
        now,
    );
}

fn finish_game(game: &mut Game, check: GameEndCheck, now: DateTime<Utc>) {
    game.status = GameStatus::Finished;
    game.current_phase = Some(GamePhase::GameOver);
    game.phase_end_time = None;
    game.winner = check.winner;
    game.record_event(GameEventType::GameEnd, winner_message(check.winner), now);
}

fn phase_start_message(phase: GamePhase, day: u32) -> String {
    match phase {
        GamePhase::DayDiscussion => format!("Day {day} discussion begins."),
        GamePhase::DayVote => format!("Day {day} vote begins. Choose who to execute."),
        GamePhase::Night => format!("Night {day} falls. Werewolves, choose your prey."),
        GamePhase::GameOver => "The game is over.".to_string(),
    }
}

fn phase_end_message(phase: GamePhase, day: u32) -> String {
    match phase {
        GamePhase::DayDiscussion => format!("Day {day} discussion has ended, moving to vote."),
        GamePhase::DayVote => format!("Day {day} vote has ended."),
        GamePhase::Night => format!("Night {day} has ended."),
        GamePhase::GameOver => "The game is over.".to_string(),
    }
}

fn execution_message(game: &Game, report: &VoteReport) -> String {
    let executed = report.executed.as_deref().and_then(|id| game.player(id));
    match executed {
        Some(player) => match player.role {
            Some(role) => format!("{} was executed. They were a {role}.", player.name),
            None => format!("{} was executed.", player.name),
        },
        None => "Nobody was executed today.".to_string(),
    }
}

fn night_message(game: &Game, report: &NightReport) -> String {
    match &report.outcome {
        NightOutcome::Killed(id) => {
            let name = game.player(id).map_or(id.as_str(), |p| p.name.as_str());
            format!("{name} was found dead this morning.")
        }
        NightOutcome::Protected(_) => {
            "The werewolves struck, but their victim was protected.".to_string()
        }
        NightOutcome::NoAttack => "The night passed quietly.".to_string(),
    }
}

fn winner_message(winner: Winner) -> String {
    match winner {
        Winner::Villagers => "The villagers win!".to_string(),
        Winner::Werewolves => "The werewolves win!".to_string(),
        Winner::None => "Nobody survived. Nobody wins.".to_string(),
    }
}

pub async fn get_game_state(state: &AppState, game_id: &str) -> Result<Game, GameServiceError> {
    load_game(state, game_id)
}

/// Current vote counts. Reads the action store without taking the game lock.
pub async fn vote_distribution(state: &AppState, game_id: &str) -> Result<Tally, GameServiceError> {
    load_game(state, game_id)?;
    Ok(state.action_store.vote_distribution(game_id))
}

pub async fn attack_distribution(
    state: &AppState,
    game_id: &str,
) -> Result<Tally, GameServiceError> {
    load_game(state, game_id)?;
    Ok(state.action_store.attack_distribution(game_id))
}

pub async fn check_winner(
    state: &AppState,
    game_id: &str,
) -> Result<GameEndCheck, GameServiceError> {
    let game = load_game(state, game_id)?;
    Ok(match game.status {
        GameStatus::Finished => GameEndCheck {
            ended: true,
            winner: game.winner,
        },
        GameStatus::InProgress => check_game_end(&game.players),
        GameStatus::Waiting => GameEndCheck {
            ended: false,
            winner: Winner::None,
        },
    })
}

/// ゲームをタイマー、キャッシュ済みアクション、ロックごと削除する
pub async fn delete_game(state: &AppState, game_id: &str) -> Result<(), GameServiceError> {
    let guard = state.lock_game(game_id).await;
    let existed = state.repository.delete(game_id)?;
    state.scheduler.cancel(game_id);
    state.action_store.remove(game_id);
    drop(guard);
    state.forget_game(game_id);

    if existed {
        info!("Game {game_id} deleted");
        Ok(())
    } else {
        Err(GameServiceError::GameNotFound(game_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::utils::clock::Clock;
    use crate::utils::test_setup::{game_with_roles, roster, test_state};

    async fn seeded_game(state: &AppState, roles: &[Role]) -> Game {
        let game = game_with_roles(roles);
        state.repository.save(&game).unwrap();
        state.action_store.initialize(&game.id);
        game
    }

    #[tokio::test]
    async fn create_game_rejects_bad_rosters() {
        let harness = test_state(1);
        let err = create_game(&harness.state, roster(2), GameSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GameServiceError::InvalidSettings(SettingsError::NotEnoughPlayers(2))
        ));

        let mut players = roster(4);
        players[3].id = "1".to_string();
        let err = create_game(&harness.state, players, GameSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GameServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn start_game_opens_the_first_discussion() {
        let harness = test_state(2);
        let state = &harness.state;
        let game = create_game(state, roster(5), GameSettings::default())
            .await
            .unwrap();

        let started = start_game(state, &game.id).await.unwrap();
        assert_eq!(started.status, GameStatus::InProgress);
        assert_eq!(started.current_phase, Some(GamePhase::DayDiscussion));
        assert_eq!(started.current_day, 1);
        assert_eq!(
            started.phase_end_time,
            Some(harness.clock.now() + chrono::Duration::seconds(180))
        );
        assert_eq!(started.events.len(), 1);
        assert_eq!(started.events[0].event_type, GameEventType::PhaseChange);
        assert!(started.players.iter().all(|p| p.role.is_some()));
        assert!(state.action_store.contains(&game.id));
        assert!(state.scheduler.is_scheduled(&game.id));

        let again = start_game(state, &game.id).await.unwrap_err();
        assert!(matches!(again, GameServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn missing_store_entry_is_rebuilt_during_transition() {
        let harness = test_state(3);
        let state = &harness.state;
        let game = seeded_game(
            state,
            &[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer],
        )
        .await;
        state.action_store.remove(&game.id);

        let advanced = advance_phase(state, &game.id).await.unwrap();
        assert_eq!(advanced.current_phase, Some(GamePhase::DayVote));
        assert!(state.action_store.contains(&game.id));
    }

    #[tokio::test]
    async fn werewolf_parity_after_a_vote_waits_for_the_night() {
        let harness = test_state(4);
        let state = &harness.state;
        // 1,2: 人狼、3..5: 村人
        let mut game = seeded_game(
            state,
            &[
                Role::Werewolf,
                Role::Werewolf,
                Role::Villager,
                Role::Villager,
                Role::Villager,
            ],
        )
        .await;
        game.current_phase = Some(GamePhase::DayVote);
        state.repository.save(&game).unwrap();
        for voter in ["1", "2", "3", "4", "5"] {
            let target = if voter == "3" { "4" } else { "3" };
            let outcome = submit_action(state, &game.id, voter, target, ActionKind::Vote)
                .await
                .unwrap();
            assert!(outcome.success);
        }

        let after_vote = advance_phase(state, &game.id).await.unwrap();
        assert!(!after_vote.is_alive("3"));
        assert_eq!(after_vote.status, GameStatus::InProgress);
        assert_eq!(after_vote.current_phase, Some(GamePhase::Night));

        let after_night = advance_phase(state, &game.id).await.unwrap();
        assert_eq!(after_night.status, GameStatus::Finished);
        assert_eq!(after_night.winner, Winner::Werewolves);
    }

    #[tokio::test]
    async fn unknown_games_leave_no_locks_behind() {
        let harness = test_state(6);
        let state = &harness.state;
        for i in 0..50 {
            let game_id = format!("missing-{i}");
            let err = submit_action(state, &game_id, "1", "2", ActionKind::Vote)
                .await
                .unwrap_err();
            assert!(matches!(err, GameServiceError::GameNotFound(_)));
            let err = advance_phase(state, &game_id).await.unwrap_err();
            assert!(matches!(err, GameServiceError::GameNotFound(_)));
            let err = start_game(state, &game_id).await.unwrap_err();
            assert!(matches!(err, GameServiceError::GameNotFound(_)));
        }
        assert_eq!(state.tracked_locks(), 0);
        assert_eq!(state.open_channels(), 0);
    }

    #[tokio::test]
    async fn failed_timer_transition_is_retried() {
        use crate::services::game_repository::{GameRepository, InMemoryGameRepository};
        use crate::services::scheduler::ManualTimer;
        use crate::utils::clock::ManualClock;
        use crate::utils::config::Config;
        use crate::utils::random::SeededRandom;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // 次の`failures`回の保存だけ失敗させる
        struct FlakyRepository {
            inner: InMemoryGameRepository,
            failures: AtomicUsize,
        }

        impl GameRepository for FlakyRepository {
            fn load(&self, game_id: &str) -> Result<Option<Game>, RepositoryError> {
                self.inner.load(game_id)
            }
            fn save(&self, game: &Game) -> Result<(), RepositoryError> {
                let failing = self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    return Err(RepositoryError::Backend("unavailable".to_string()));
                }
                self.inner.save(game)
            }
            fn delete(&self, game_id: &str) -> Result<bool, RepositoryError> {
                self.inner.delete(game_id)
            }
            fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
                self.inner.list_ids()
            }
        }

        let repository = Arc::new(FlakyRepository {
            inner: InMemoryGameRepository::new(),
            failures: AtomicUsize::new(0),
        });
        let timer = Arc::new(ManualTimer::new());
        let config = Config {
            phase_retry_delay: std::time::Duration::from_secs(7),
            ..Config::default()
        };
        let state = AppState::with_services(
            config,
            repository.clone(),
            timer.clone(),
            Arc::new(ManualClock::default()),
            Arc::new(SeededRandom::new(6)),
        );
        let game = game_with_roles(&[
            Role::Werewolf,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        repository.save(&game).unwrap();
        state.action_store.initialize(&game.id);
        let stamp = game.phase_stamp().unwrap();

        repository.failures.store(1, Ordering::SeqCst);
        on_phase_timer(state.clone(), game.id.clone(), stamp).await;
        let unchanged = get_game_state(&state, &game.id).await.unwrap();
        assert_eq!(unchanged.current_phase, Some(GamePhase::DayDiscussion));
        assert!(state.scheduler.is_scheduled(&game.id));
        assert_eq!(timer.next_delay(), Some(std::time::Duration::from_secs(7)));

        assert!(timer.fire_next().await);
        let voting = get_game_state(&state, &game.id).await.unwrap();
        assert_eq!(voting.current_phase, Some(GamePhase::DayVote));
        assert_eq!(timer.next_delay(), Some(std::time::Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn finishing_closes_the_narration_channel() {
        let harness = test_state(7);
        let state = &harness.state;
        let mut game = seeded_game(
            state,
            &[Role::Werewolf, Role::Villager, Role::Villager, Role::Villager],
        )
        .await;
        game.current_phase = Some(GamePhase::DayVote);
        state.repository.save(&game).unwrap();
        let mut narration = state.subscribe(&game.id);
        for voter in ["1", "2", "3", "4"] {
            let target = if voter == "1" { "2" } else { "1" };
            assert!(submit_action(state, &game.id, voter, target, ActionKind::Vote)
                .await
                .unwrap()
                .success);
        }

        let finished = advance_phase(state, &game.id).await.unwrap();
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(state.open_channels(), 0);
        assert_eq!(state.tracked_locks(), 0);

        // クローズ前に送られたメッセージは届き、その後チャネルが閉じる
        let mut received = 0;
        while narration.recv().await.is_ok() {
            received += 1;
        }
        assert!(received >= 2);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_stored_game() {
        use crate::services::game_repository::GameRepository;
        use crate::services::scheduler::ManualTimer;
        use crate::utils::clock::ManualClock;
        use crate::utils::config::Config;
        use crate::utils::random::SeededRandom;
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct ReadOnlyRepository {
            game: Mutex<Option<Game>>,
        }

        impl GameRepository for ReadOnlyRepository {
            fn load(&self, _: &str) -> Result<Option<Game>, RepositoryError> {
                Ok(self.game.lock().unwrap().clone())
            }
            fn save(&self, _: &Game) -> Result<(), RepositoryError> {
                Err(RepositoryError::Backend("read only".to_string()))
            }
            fn delete(&self, _: &str) -> Result<bool, RepositoryError> {
                Ok(false)
            }
            fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
                Ok(Vec::new())
            }
        }

        let repository = Arc::new(ReadOnlyRepository::default());
        let mut game = game_with_roles(&[
            Role::Werewolf,
            Role::Villager,
            Role::Villager,
            Role::Villager,
        ]);
        game.current_phase = Some(GamePhase::DayVote);
        *repository.game.lock().unwrap() = Some(game.clone());

        let state = AppState::with_services(
            Config::default(),
            repository.clone(),
            Arc::new(ManualTimer::new()),
            Arc::new(ManualClock::default()),
            Arc::new(SeededRandom::new(5)),
        );
        state.action_store.initialize(&game.id);
        state
            .action_store
            .record_action(&game.id, ActionKind::Vote, "2", "1");

        let err = advance_phase(&state, &game.id).await.unwrap_err();
        assert!(matches!(err, GameServiceError::Repository(_)));
        // フェーズが確定していないので投票は残る
        assert_eq!(
            state.action_store.get(&game.id).unwrap().target_of(ActionKind::Vote, "2"),
            Some("1")
        );
        assert!(!state.scheduler.is_scheduled(&game.id));
    }
}
