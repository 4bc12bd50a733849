use serde::{Deserialize, Serialize};

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeathCause {
    #[default]
    None,
    Execution,
    WerewolfAttack,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub role: Option<Role>,
    pub is_alive: bool,
    pub death_cause: DeathCause,
    pub death_day: Option<u32>,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            is_alive: true,
            death_cause: DeathCause::None,
            death_day: None,
        }
    }

    pub fn is_werewolf(&self) -> bool {
        self.role.is_some_and(Role::is_werewolf)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Marks the player dead. Returns `false` (and changes nothing) if the
    /// player was already dead: cause and day are recorded exactly once.
    pub fn kill(&mut self, cause: DeathCause, day: u32) -> bool {
        if !self.is_alive {
            return false;
        }
        self.is_alive = false;
        self.death_cause = cause;
        self.death_day = Some(day);
        true
    }

    pub fn was_executed_on(&self, day: u32) -> bool {
        !self.is_alive && self.death_cause == DeathCause::Execution && self.death_day == Some(day)
    }
}
