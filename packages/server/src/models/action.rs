use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::game::GamePhase;
use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Vote,
    Attack,
    Divine,
    Guard,
    Medium,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Vote,
        ActionKind::Attack,
        ActionKind::Divine,
        ActionKind::Guard,
        ActionKind::Medium,
    ];

    /// Role required to take this action. Anyone alive may vote.
    pub fn required_role(self) -> Option<Role> {
        match self {
            ActionKind::Vote => None,
            ActionKind::Attack => Some(Role::Werewolf),
            ActionKind::Divine => Some(Role::Seer),
            ActionKind::Guard => Some(Role::Bodyguard),
            ActionKind::Medium => Some(Role::Medium),
        }
    }

    pub fn allowed_in(self, phase: GamePhase) -> bool {
        match self {
            ActionKind::Vote => phase == GamePhase::DayVote,
            ActionKind::Attack | ActionKind::Divine | ActionKind::Guard => {
                phase == GamePhase::Night
            }
            ActionKind::Medium => matches!(phase, GamePhase::Night | GamePhase::DayDiscussion),
        }
    }

    /// Maps cleared once `phase` has been resolved.
    pub fn cleared_after(phase: GamePhase) -> &'static [ActionKind] {
        match phase {
            GamePhase::DayVote => &[ActionKind::Vote, ActionKind::Medium],
            GamePhase::Night => &[
                ActionKind::Attack,
                ActionKind::Guard,
                ActionKind::Divine,
                ActionKind::Medium,
            ],
            GamePhase::DayDiscussion | GamePhase::GameOver => &[],
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Vote => write!(f, "vote"),
            ActionKind::Attack => write!(f, "attack"),
            ActionKind::Divine => write!(f, "divination"),
            ActionKind::Guard => write!(f, "guard"),
            ActionKind::Medium => write!(f, "medium reading"),
        }
    }
}

/// Actor id to target id, one map per action kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub votes: HashMap<String, String>,
    pub attacks: HashMap<String, String>,
    pub divinations: HashMap<String, String>,
    pub guards: HashMap<String, String>,
    pub mediums: HashMap<String, String>,
}

impl ActionRecord {
    pub fn map(&self, kind: ActionKind) -> &HashMap<String, String> {
        match kind {
            ActionKind::Vote => &self.votes,
            ActionKind::Attack => &self.attacks,
            ActionKind::Divine => &self.divinations,
            ActionKind::Guard => &self.guards,
            ActionKind::Medium => &self.mediums,
        }
    }

    pub fn map_mut(&mut self, kind: ActionKind) -> &mut HashMap<String, String> {
        match kind {
            ActionKind::Vote => &mut self.votes,
            ActionKind::Attack => &mut self.attacks,
            ActionKind::Divine => &mut self.divinations,
            ActionKind::Guard => &mut self.guards,
            ActionKind::Medium => &mut self.mediums,
        }
    }

    /// Records `actor`'s action, replacing any earlier one of the same kind.
    pub fn record(&mut self, kind: ActionKind, actor_id: &str, target_id: &str) -> Option<String> {
        self.map_mut(kind)
            .insert(actor_id.to_string(), target_id.to_string())
    }

    pub fn target_of(&self, kind: ActionKind, actor_id: &str) -> Option<&str> {
        self.map(kind).get(actor_id).map(String::as_str)
    }

    pub fn clear(&mut self, kinds: &[ActionKind]) {
        for kind in kinds {
            self.map_mut(*kind).clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        ActionKind::ALL.iter().all(|kind| self.map(*kind).is_empty())
    }
}

/// One action chosen on a player's behalf by the backfill pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionAssignment {
    pub kind: ActionKind,
    pub actor_id: String,
    pub target_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_action_overwrites_earlier_one() {
        let mut record = ActionRecord::default();
        assert_eq!(record.record(ActionKind::Vote, "1", "2"), None);
        assert_eq!(
            record.record(ActionKind::Vote, "1", "3"),
            Some("2".to_string())
        );
        assert_eq!(record.target_of(ActionKind::Vote, "1"), Some("3"));
        assert_eq!(record.votes.len(), 1);
    }

    #[test]
    fn medium_reads_are_allowed_by_day_and_night() {
        assert!(ActionKind::Medium.allowed_in(GamePhase::DayDiscussion));
        assert!(ActionKind::Medium.allowed_in(GamePhase::Night));
        assert!(!ActionKind::Medium.allowed_in(GamePhase::DayVote));
        assert!(!ActionKind::Attack.allowed_in(GamePhase::DayVote));
        assert!(ActionKind::Vote.allowed_in(GamePhase::DayVote));
    }

    #[test]
    fn kind_parses_from_lowercase_names() {
        let kind: ActionKind = serde_json::from_str("\"divine\"").unwrap();
        assert_eq!(kind, ActionKind::Divine);
    }
}
