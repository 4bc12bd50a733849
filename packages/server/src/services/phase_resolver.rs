use std::collections::HashMap;

use crate::models::{
    action::{ActionKind, ActionRecord},
    game::{Game, RevealType},
    player::DeathCause,
};
use crate::services::action_service::insight_message;
use crate::services::action_store::Tally;
use crate::utils::random::{choose, RandomSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReport {
    pub tally: Tally,
    pub executed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NightOutcome {
    Killed(String),
    Protected(String),
    NoAttack,
}

/// Private answer to a divination or medium reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    pub kind: ActionKind,
    pub actor_id: String,
    pub target_id: String,
    pub is_werewolf: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightReport {
    pub tally: Tally,
    pub outcome: NightOutcome,
    pub insights: Vec<Insight>,
}

/// Counts targets of `map`, skipping entries whose actor or target is no
/// longer alive.
pub fn tally_alive(game: &Game, map: &HashMap<String, String>) -> Tally {
    let mut tally = Tally::new();
    for (actor, target) in map {
        if game.is_alive(actor) && game.is_alive(target) {
            *tally.entry(target.clone()).or_default() += 1;
        }
    }
    tally
}

/// Most picked target; ties are settled by a uniform draw.
pub fn pick_top(tally: &Tally, rng: &dyn RandomSource) -> Option<String> {
    let top = tally.values().copied().max()?;
    let mut tied: Vec<&String> = tally
        .iter()
        .filter(|&(_, &count)| count == top)
        .map(|(id, _)| id)
        .collect();
    // HashMapの順序は不定なので、シード固定で再現できるようソートする
    tied.sort();
    choose(rng, &tied).map(|id| id.to_string())
}

/// Executes the most voted player and reveals their role.
pub fn resolve_vote_phase(
    game: &mut Game,
    actions: &ActionRecord,
    rng: &dyn RandomSource,
) -> VoteReport {
    let tally = tally_alive(game, &actions.votes);
    let executed = pick_top(&tally, rng);

    if let Some(target_id) = &executed {
        let day = game.current_day;
        if let Some(player) = game.player_mut(target_id) {
            player.kill(DeathCause::Execution, day);
        }
        game.reveal_role(target_id, RevealType::Execution);
    }

    VoteReport { tally, executed }
}

/// Carries out the werewolves' attack unless a bodyguard covered the victim,
/// and answers the night's divinations and medium readings.
pub fn resolve_night_phase(
    game: &mut Game,
    actions: &ActionRecord,
    rng: &dyn RandomSource,
) -> NightReport {
    let insights = collect_insights(game, actions);
    let tally = tally_alive(game, &actions.attacks);

    let outcome = match pick_top(&tally, rng) {
        None => NightOutcome::NoAttack,
        Some(target_id) if actions.guards.values().any(|guarded| *guarded == target_id) => {
            NightOutcome::Protected(target_id)
        }
        Some(target_id) => {
            let day = game.current_day;
            if let Some(player) = game.player_mut(&target_id) {
                player.kill(DeathCause::WerewolfAttack, day);
            }
            NightOutcome::Killed(target_id)
        }
    };

    NightReport {
        tally,
        outcome,
        insights,
    }
}

fn collect_insights(game: &Game, actions: &ActionRecord) -> Vec<Insight> {
    let mut insights = Vec::new();
    for kind in [ActionKind::Divine, ActionKind::Medium] {
        for (actor_id, target_id) in actions.map(kind) {
            if !game.is_alive(actor_id) {
                continue;
            }
            let Some(target) = game.player(target_id) else {
                continue;
            };
            insights.push(Insight {
                kind,
                actor_id: actor_id.clone(),
                target_id: target_id.clone(),
                is_werewolf: target.is_werewolf(),
                message: insight_message(kind, target),
            });
        }
    }
    insights.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
    insights
}
