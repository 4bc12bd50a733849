use std::collections::HashSet;

use crate::models::{
    action::{ActionAssignment, ActionKind, ActionRecord},
    game::{Game, GamePhase},
    player::Player,
};
use crate::utils::random::{choose, RandomSource};

/// Picks an action for every alive player who is expected to act in the
/// current phase but has not, so the phase can always be resolved.
/// Existing actions are left alone.
pub fn assign_missing_actions(
    game: &Game,
    actions: &ActionRecord,
    rng: &dyn RandomSource,
) -> Vec<ActionAssignment> {
    match game.current_phase {
        Some(GamePhase::DayVote) => missing_votes(game, actions, rng),
        Some(GamePhase::Night) => missing_night_actions(game, actions, rng),
        _ => Vec::new(),
    }
}

fn alive_ids_except<'g>(game: &'g Game, excluded: &str) -> Vec<&'g str> {
    game.alive_players()
        .filter(|p| p.id != excluded)
        .map(|p| p.id.as_str())
        .collect()
}

fn lacking<'g>(
    game: &'g Game,
    actions: &'g ActionRecord,
    kind: ActionKind,
) -> impl Iterator<Item = &'g Player> + 'g {
    game.alive_players()
        .filter(move |p| kind.required_role().map_or(true, |role| p.has_role(role)))
        .filter(move |p| actions.target_of(kind, &p.id).is_none())
}

fn assignment(kind: ActionKind, actor: &Player, target: &str) -> ActionAssignment {
    ActionAssignment {
        kind,
        actor_id: actor.id.clone(),
        target_id: target.to_string(),
    }
}

fn missing_votes(
    game: &Game,
    actions: &ActionRecord,
    rng: &dyn RandomSource,
) -> Vec<ActionAssignment> {
    lacking(game, actions, ActionKind::Vote)
        .filter_map(|voter| {
            let candidates = alive_ids_except(game, &voter.id);
            choose(rng, &candidates).map(|target| assignment(ActionKind::Vote, voter, target))
        })
        .collect()
}

fn missing_night_actions(
    game: &Game,
    actions: &ActionRecord,
    rng: &dyn RandomSource,
) -> Vec<ActionAssignment> {
    let mut assigned = Vec::new();

    // 未選択の人狼は一度だけ抽選した同じ対象を襲撃する
    let idle_wolves: Vec<&Player> = lacking(game, actions, ActionKind::Attack).collect();
    if !idle_wolves.is_empty() {
        let prey: Vec<&str> = game
            .alive_players()
            .filter(|p| !p.is_werewolf())
            .map(|p| p.id.as_str())
            .collect();
        if let Some(target) = choose(rng, &prey) {
            for wolf in idle_wolves {
                assigned.push(assignment(ActionKind::Attack, wolf, target));
            }
        }
    }

    for seer in lacking(game, actions, ActionKind::Divine) {
        let candidates = alive_ids_except(game, &seer.id);
        if let Some(target) = choose(rng, &candidates) {
            assigned.push(assignment(ActionKind::Divine, seer, target));
        }
    }

    let attacked: HashSet<&str> = actions
        .attacks
        .values()
        .map(String::as_str)
        .chain(
            assigned
                .iter()
                .filter(|a| a.kind == ActionKind::Attack)
                .map(|a| a.target_id.as_str()),
        )
        .collect();
    let mut guards = Vec::new();
    for bodyguard in lacking(game, actions, ActionKind::Guard) {
        let anyone = alive_ids_except(game, &bodyguard.id);
        let unattacked: Vec<&str> = anyone
            .iter()
            .copied()
            .filter(|id| !attacked.contains(id))
            .collect();
        let pool = if unattacked.is_empty() { &anyone } else { &unattacked };
        if let Some(target) = choose(rng, pool) {
            guards.push(assignment(ActionKind::Guard, bodyguard, target));
        }
    }
    assigned.extend(guards);

    let yesterday = game
        .current_day
        .checked_sub(1)
        .and_then(|day| game.executed_on(day));
    if let Some(executed) = yesterday {
        for medium in lacking(game, actions, ActionKind::Medium) {
            assigned.push(assignment(ActionKind::Medium, medium, &executed.id));
        }
    }

    assigned
}
