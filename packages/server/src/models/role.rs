use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Bodyguard,
    Medium,
}

impl Role {
    /// Special roles in the order the fallback assignment hands them out.
    pub const SPECIAL: [Role; 4] = [Role::Werewolf, Role::Seer, Role::Bodyguard, Role::Medium];

    pub fn is_werewolf(self) -> bool {
        self == Role::Werewolf
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Villager => write!(f, "Villager"),
            Role::Werewolf => write!(f, "Werewolf"),
            Role::Seer => write!(f, "Seer"),
            Role::Bodyguard => write!(f, "Bodyguard"),
            Role::Medium => write!(f, "Medium"),
        }
    }
}
