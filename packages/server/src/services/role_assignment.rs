use log::{error, warn};

use crate::models::{
    player::{DeathCause, Player},
    role::Role,
    settings::GameSettings,
};
use crate::utils::random::{shuffle, RandomSource};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoleAssignmentError {
    #[error("{requested} special roles requested for only {roster} players")]
    CountsExceedRoster { requested: usize, roster: usize },
    #[error("expected {expected} {role} but assigned {actual}")]
    CountMismatch {
        role: Role,
        expected: usize,
        actual: usize,
    },
}

pub fn requested_count(settings: &GameSettings, role: Role, roster_size: usize) -> usize {
    match role {
        Role::Werewolf => settings.werewolf_count,
        Role::Seer => settings.seer_count,
        Role::Bodyguard => settings.bodyguard_count,
        Role::Medium => settings.medium_count,
        Role::Villager => roster_size.saturating_sub(settings.special_role_count()),
    }
}

/// Hands every player a role so that each role appears exactly as often as
/// `settings` asks, everyone else being a villager. All players come back alive.
pub fn assign_roles(
    roster: &[Player],
    settings: &GameSettings,
    rng: &dyn RandomSource,
) -> Result<Vec<Player>, RoleAssignmentError> {
    let requested = settings.special_role_count();
    if requested > roster.len() {
        return Err(RoleAssignmentError::CountsExceedRoster {
            requested,
            roster: roster.len(),
        });
    }

    let mut pool = build_role_pool(settings, roster.len());
    shuffle(rng, &mut pool);

    let players: Vec<Player> = roster
        .iter()
        .zip(pool)
        .map(|(player, role)| with_role(player, role))
        .collect();

    match verify_counts(&players, settings) {
        Ok(()) => Ok(players),
        Err(mismatch) => {
            warn!("Shuffled role assignment is off ({mismatch}), rebuilding it");
            let players = fallback_assignment(roster, settings, rng);
            verify_counts(&players, settings).map_err(|e| {
                error!("Fallback role assignment is still off: {e}");
                e
            })?;
            Ok(players)
        }
    }
}

fn build_role_pool(settings: &GameSettings, roster_size: usize) -> Vec<Role> {
    let mut pool = Vec::with_capacity(roster_size);
    for role in Role::SPECIAL {
        let count = requested_count(settings, role, roster_size);
        pool.extend(std::iter::repeat(role).take(count));
    }
    pool.resize(roster_size, Role::Villager);
    pool
}

fn with_role(player: &Player, role: Role) -> Player {
    Player {
        role: Some(role),
        is_alive: true,
        death_cause: DeathCause::None,
        death_day: None,
        ..player.clone()
    }
}

/// Closed-form assignment: one shuffled permutation of seats, consumed in
/// consecutive ranges per special role. Everyone left over is a villager.
pub(crate) fn fallback_assignment(
    roster: &[Player],
    settings: &GameSettings,
    rng: &dyn RandomSource,
) -> Vec<Player> {
    let mut players: Vec<Player> = roster
        .iter()
        .map(|p| with_role(p, Role::Villager))
        .collect();

    let mut seats: Vec<usize> = (0..players.len()).collect();
    shuffle(rng, &mut seats);

    let mut offset = 0;
    for role in Role::SPECIAL {
        let count = requested_count(settings, role, players.len());
        let end = (offset + count).min(seats.len());
        for &seat in &seats[offset..end] {
            players[seat].role = Some(role);
        }
        offset = end;
    }
    players
}

pub(crate) fn verify_counts(
    players: &[Player],
    settings: &GameSettings,
) -> Result<(), RoleAssignmentError> {
    for role in Role::SPECIAL.into_iter().chain([Role::Villager]) {
        let expected = requested_count(settings, role, players.len());
        let actual = players.iter().filter(|p| p.has_role(role)).count();
        if expected != actual {
            return Err(RoleAssignmentError::CountMismatch {
                role,
                expected,
                actual,
            });
        }
    }
    Ok(())
}
