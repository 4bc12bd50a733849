use serde::Serialize;

use crate::models::{
    action::ActionKind,
    game::{Game, GamePhase},
    player::Player,
    role::Role,
};
use crate::services::action_store::ActionStore;

/// A player action that breaks the game rules. These are routine and are
/// reported back to the player, never raised as service errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejection {
    #[error("This {kind} cannot be submitted {}", phase_label(.phase))]
    InvalidPhase {
        kind: ActionKind,
        phase: Option<GamePhase>,
    },
    #[error("Player {0} is not part of this game")]
    ActorNotFound(String),
    #[error("Dead players cannot act")]
    ActorDead,
    #[error("Target player {0} was not found")]
    TargetNotFound(String),
    #[error("{0} is already dead")]
    TargetDead(String),
    #[error("{0} is still alive")]
    TargetAlive(String),
    #[error("{0} was not executed yesterday")]
    TargetNotExecutedYesterday(String),
    #[error("Only a {role} can submit this {kind}")]
    WrongRole { kind: ActionKind, role: Role },
    #[error("Werewolves cannot attack another werewolf")]
    FriendlyFire,
}

fn phase_label(phase: &Option<GamePhase>) -> String {
    match phase {
        Some(GamePhase::GameOver) => "after the game is over".to_string(),
        Some(phase) => format!("during the {phase} phase"),
        None => "before the game has started".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub message: String,
    pub target_username: Option<String>,
    pub is_werewolf: Option<bool>,
}

/// What the caller of an action gets back, accepted or not.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_werewolf: Option<bool>,
    #[serde(skip)]
    pub rejection: Option<ActionRejection>,
}

impl From<Result<ActionReceipt, ActionRejection>> for ActionOutcome {
    fn from(result: Result<ActionReceipt, ActionRejection>) -> Self {
        match result {
            Ok(receipt) => ActionOutcome {
                success: true,
                message: receipt.message,
                target_username: receipt.target_username,
                is_werewolf: receipt.is_werewolf,
                rejection: None,
            },
            Err(rejection) => ActionOutcome {
                success: false,
                message: rejection.to_string(),
                target_username: None,
                is_werewolf: None,
                rejection: Some(rejection),
            },
        }
    }
}

/// Checks an action against the current phase, the actor and the target.
/// The first failing rule decides the rejection.
pub fn validate_action<'g>(
    game: &'g Game,
    kind: ActionKind,
    actor_id: &str,
    target_id: &str,
) -> Result<&'g Player, ActionRejection> {
    if !game.current_phase.is_some_and(|phase| kind.allowed_in(phase)) {
        return Err(ActionRejection::InvalidPhase {
            kind,
            phase: game.current_phase,
        });
    }

    let actor = game
        .player(actor_id)
        .ok_or_else(|| ActionRejection::ActorNotFound(actor_id.to_string()))?;
    if !actor.is_alive {
        return Err(ActionRejection::ActorDead);
    }

    let target = game
        .player(target_id)
        .ok_or_else(|| ActionRejection::TargetNotFound(target_id.to_string()))?;
    if kind == ActionKind::Medium {
        if target.is_alive {
            return Err(ActionRejection::TargetAlive(target.name.clone()));
        }
        let yesterday = game.current_day.checked_sub(1);
        if !yesterday.is_some_and(|day| target.was_executed_on(day)) {
            return Err(ActionRejection::TargetNotExecutedYesterday(
                target.name.clone(),
            ));
        }
    } else if !target.is_alive {
        return Err(ActionRejection::TargetDead(target.name.clone()));
    }

    if let Some(role) = kind.required_role() {
        if !actor.has_role(role) {
            return Err(ActionRejection::WrongRole { kind, role });
        }
    }

    if kind == ActionKind::Attack && target.is_werewolf() {
        return Err(ActionRejection::FriendlyFire);
    }

    Ok(target)
}

/// Validates and records one action. The caller must hold the game's lock.
pub fn handle_action(
    game: &Game,
    store: &ActionStore,
    kind: ActionKind,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    let target = validate_action(game, kind, actor_id, target_id)?;
    store.record_action(&game.id, kind, actor_id, target_id);
    Ok(receipt(kind, target))
}

pub fn handle_vote(
    game: &Game,
    store: &ActionStore,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    handle_action(game, store, ActionKind::Vote, actor_id, target_id)
}

pub fn handle_attack(
    game: &Game,
    store: &ActionStore,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    handle_action(game, store, ActionKind::Attack, actor_id, target_id)
}

pub fn handle_divine(
    game: &Game,
    store: &ActionStore,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    handle_action(game, store, ActionKind::Divine, actor_id, target_id)
}

pub fn handle_guard(
    game: &Game,
    store: &ActionStore,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    handle_action(game, store, ActionKind::Guard, actor_id, target_id)
}

pub fn handle_medium(
    game: &Game,
    store: &ActionStore,
    actor_id: &str,
    target_id: &str,
) -> Result<ActionReceipt, ActionRejection> {
    handle_action(game, store, ActionKind::Medium, actor_id, target_id)
}

/// Text a seer or medium learns about `target`.
pub fn insight_message(kind: ActionKind, target: &Player) -> String {
    let verdict = if target.is_werewolf() {
        "a werewolf"
    } else {
        "not a werewolf"
    };
    match kind {
        ActionKind::Medium => format!("{} was {}.", target.name, verdict),
        _ => format!("{} is {}.", target.name, verdict),
    }
}

fn receipt(kind: ActionKind, target: &Player) -> ActionReceipt {
    let plain = |message: String| ActionReceipt {
        message,
        target_username: None,
        is_werewolf: None,
    };
    match kind {
        ActionKind::Vote => plain(format!("You voted for {}.", target.name)),
        ActionKind::Attack => plain(format!("You chose to attack {} tonight.", target.name)),
        ActionKind::Guard => plain(format!("You are guarding {} tonight.", target.name)),
        ActionKind::Divine | ActionKind::Medium => ActionReceipt {
            message: insight_message(kind, target),
            target_username: Some(target.name.clone()),
            is_werewolf: Some(target.is_werewolf()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::GameStatus;
    use crate::models::player::DeathCause;
    use crate::utils::clock::SystemClock;
    use crate::utils::test_setup::game_with_roles;
    use std::sync::Arc;
    use std::time::Duration;

    // 席順: 1,2 人狼、3 占い師、4 騎士、5 霊媒師、6 村人
    fn game(phase: GamePhase) -> Game {
        let mut game = game_with_roles(&[
            Role::Werewolf,
            Role::Werewolf,
            Role::Seer,
            Role::Bodyguard,
            Role::Medium,
            Role::Villager,
        ]);
        game.current_phase = Some(phase);
        game
    }

    fn store() -> ActionStore {
        ActionStore::new(
            10,
            Duration::from_secs(600),
            Duration::from_secs(5),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn attack_outside_night_fails_for_any_role() {
        for phase in [GamePhase::DayDiscussion, GamePhase::DayVote, GamePhase::GameOver] {
            let game = game(phase);
            for actor in ["1", "3", "6"] {
                let err = validate_action(&game, ActionKind::Attack, actor, "6").unwrap_err();
                assert!(matches!(err, ActionRejection::InvalidPhase { .. }));
            }
        }
    }

    #[test]
    fn actions_before_start_fail_on_phase() {
        let mut game = game(GamePhase::DayVote);
        game.current_phase = None;
        game.status = GameStatus::Waiting;
        let err = validate_action(&game, ActionKind::Vote, "1", "2").unwrap_err();
        assert_eq!(
            err.to_string(),
            "This vote cannot be submitted before the game has started"
        );
    }

    #[test]
    fn dead_voter_is_rejected() {
        let mut game = game(GamePhase::DayVote);
        game.player_mut("6").unwrap().kill(DeathCause::WerewolfAttack, 1);
        let store = store();
        let err = handle_vote(&game, &store, "6", "1").unwrap_err();
        assert_eq!(err, ActionRejection::ActorDead);
        assert!(store.get(&game.id).is_none());
    }

    #[test]
    fn vote_is_recorded() {
        let game = game(GamePhase::DayVote);
        let store = store();
        store.initialize(&game.id);
        let receipt = handle_vote(&game, &store, "3", "1").unwrap();
        assert_eq!(receipt.message, "You voted for Player1.");
        let actions = store.get(&game.id).unwrap();
        assert_eq!(actions.target_of(ActionKind::Vote, "3"), Some("1"));
    }

    #[test]
    fn unknown_actor_and_target_are_rejected() {
        let game = game(GamePhase::DayVote);
        assert_eq!(
            validate_action(&game, ActionKind::Vote, "99", "1").unwrap_err(),
            ActionRejection::ActorNotFound("99".to_string())
        );
        assert_eq!(
            validate_action(&game, ActionKind::Vote, "1", "99").unwrap_err(),
            ActionRejection::TargetNotFound("99".to_string())
        );
    }

    #[test]
    fn dead_target_is_rejected() {
        let mut game = game(GamePhase::Night);
        game.player_mut("6").unwrap().kill(DeathCause::Execution, 1);
        assert_eq!(
            validate_action(&game, ActionKind::Guard, "4", "6").unwrap_err(),
            ActionRejection::TargetDead("Player6".to_string())
        );
    }

    #[test]
    fn night_actions_require_matching_role() {
        let game = game(GamePhase::Night);
        assert_eq!(
            validate_action(&game, ActionKind::Attack, "6", "3").unwrap_err(),
            ActionRejection::WrongRole {
                kind: ActionKind::Attack,
                role: Role::Werewolf
            }
        );
        assert!(matches!(
            validate_action(&game, ActionKind::Divine, "1", "3").unwrap_err(),
            ActionRejection::WrongRole { .. }
        ));
        assert!(matches!(
            validate_action(&game, ActionKind::Guard, "3", "6").unwrap_err(),
            ActionRejection::WrongRole { .. }
        ));
    }

    #[test]
    fn werewolves_cannot_attack_each_other() {
        let game = game(GamePhase::Night);
        assert_eq!(
            validate_action(&game, ActionKind::Attack, "1", "2").unwrap_err(),
            ActionRejection::FriendlyFire
        );
        assert!(validate_action(&game, ActionKind::Attack, "1", "6").is_ok());
    }

    #[test]
    fn phase_check_comes_before_role_check() {
        let game = game(GamePhase::DayVote);
        let err = validate_action(&game, ActionKind::Divine, "6", "1").unwrap_err();
        assert!(matches!(err, ActionRejection::InvalidPhase { .. }));
    }

    #[test]
    fn divination_reports_alignment() {
        let game = game(GamePhase::Night);
        let store = store();
        let receipt = handle_divine(&game, &store, "3", "2").unwrap();
        assert_eq!(receipt.target_username.as_deref(), Some("Player2"));
        assert_eq!(receipt.is_werewolf, Some(true));

        let receipt = handle_divine(&game, &store, "3", "6").unwrap();
        assert_eq!(receipt.is_werewolf, Some(false));
        let actions = store.get(&game.id).unwrap();
        assert_eq!(actions.target_of(ActionKind::Divine, "3"), Some("6"));
    }

    #[test]
    fn guard_and_attack_are_recorded() {
        let game = game(GamePhase::Night);
        let store = store();
        handle_guard(&game, &store, "4", "3").unwrap();
        handle_attack(&game, &store, "1", "3").unwrap();
        let actions = store.get(&game.id).unwrap();
        assert_eq!(actions.target_of(ActionKind::Guard, "4"), Some("3"));
        assert_eq!(actions.target_of(ActionKind::Attack, "1"), Some("3"));
    }

    #[test]
    fn medium_reads_only_yesterdays_execution() {
        let mut game = game(GamePhase::DayDiscussion);
        game.current_day = 3;
        game.player_mut("1").unwrap().kill(DeathCause::Execution, 2);
        game.player_mut("6").unwrap().kill(DeathCause::Execution, 1);
        game.player_mut("3").unwrap().kill(DeathCause::WerewolfAttack, 2);
        let store = store();

        let receipt = handle_medium(&game, &store, "5", "1").unwrap();
        assert_eq!(receipt.is_werewolf, Some(true));
        assert_eq!(receipt.message, "Player1 was a werewolf.");

        assert_eq!(
            handle_medium(&game, &store, "5", "6").unwrap_err(),
            ActionRejection::TargetNotExecutedYesterday("Player6".to_string())
        );
        assert_eq!(
            handle_medium(&game, &store, "5", "3").unwrap_err(),
            ActionRejection::TargetNotExecutedYesterday("Player3".to_string())
        );
        assert_eq!(
            handle_medium(&game, &store, "5", "2").unwrap_err(),
            ActionRejection::TargetAlive("Player2".to_string())
        );
    }

    #[test]
    fn medium_cannot_read_during_vote() {
        let mut game = game(GamePhase::DayVote);
        game.current_day = 2;
        game.player_mut("1").unwrap().kill(DeathCause::Execution, 1);
        assert!(matches!(
            validate_action(&game, ActionKind::Medium, "5", "1").unwrap_err(),
            ActionRejection::InvalidPhase { .. }
        ));
    }

    #[test]
    fn outcome_carries_rejection_message() {
        let outcome = ActionOutcome::from(Err(ActionRejection::FriendlyFire));
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Werewolves cannot attack another werewolf");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("rejection").is_none());
    }
}
