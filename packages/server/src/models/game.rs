use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{player::Player, role::Role, settings::GameSettings};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Game {
    pub id: String,
    pub players: Vec<Player>,
    pub status: GameStatus,
    pub current_phase: Option<GamePhase>,
    pub current_day: u32,
    pub phase_end_time: Option<DateTime<Utc>>,
    pub winner: Winner,
    pub events: Vec<GameEvent>,
    pub revealed_roles: Vec<RevealedRole>,
    pub settings: GameSettings,
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Game {{ id: {}, status: {:?}, phase: {:?}, day: {}, alive: {}/{}, winner: {:?} }}",
            self.id,
            self.status,
            self.current_phase,
            self.current_day,
            self.alive_players().count(),
            self.players.len(),
            self.winner
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Waiting,
    InProgress,
    Finished,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    DayDiscussion,
    DayVote,
    Night,
    GameOver,
}

impl GamePhase {
    /// Phase that follows `self` on `day`, together with the day it belongs to.
    pub fn next(self, day: u32) -> (GamePhase, u32) {
        match self {
            GamePhase::DayDiscussion => (GamePhase::DayVote, day),
            GamePhase::DayVote => (GamePhase::Night, day),
            GamePhase::Night => (GamePhase::DayDiscussion, day + 1),
            GamePhase::GameOver => (GamePhase::GameOver, day),
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GamePhase::DayDiscussion => write!(f, "discussion"),
            GamePhase::DayVote => write!(f, "vote"),
            GamePhase::Night => write!(f, "night"),
            GamePhase::GameOver => write!(f, "game over"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Villagers,
    Werewolves,
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventType {
    PhaseChange,
    GameEnd,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: String,
    pub event_type: GameEventType,
    pub day: u32,
    pub phase: Option<GamePhase>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(
        event_type: GameEventType,
        day: u32,
        phase: Option<GamePhase>,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        GameEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            day,
            phase,
            message,
            timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevealType {
    Execution,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealedRole {
    pub player_id: String,
    pub role: Role,
    pub reveal_day: u32,
    pub reveal_type: RevealType,
}

/// Identifies the phase a timer was armed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseStamp {
    pub day: u32,
    pub phase: GamePhase,
}

impl Game {
    pub fn new(id: String, players: Vec<Player>, settings: GameSettings) -> Self {
        Game {
            id,
            players,
            status: GameStatus::Waiting,
            current_phase: None,
            current_day: 0,
            phase_end_time: None,
            winner: Winner::None,
            events: Vec::new(),
            revealed_roles: Vec::new(),
            settings,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn is_alive(&self, player_id: &str) -> bool {
        self.player(player_id).is_some_and(|p| p.is_alive)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive)
    }

    /// The player executed on `day`, if the vote that day killed someone.
    pub fn executed_on(&self, day: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.was_executed_on(day))
    }

    pub fn phase_stamp(&self) -> Option<PhaseStamp> {
        self.current_phase.map(|phase| PhaseStamp {
            day: self.current_day,
            phase,
        })
    }

    pub fn record_event(
        &mut self,
        event_type: GameEventType,
        message: String,
        timestamp: DateTime<Utc>,
    ) {
        let event = GameEvent::new(
            event_type,
            self.current_day,
            self.current_phase,
            message,
            timestamp,
        );
        self.events.push(event);
    }

    /// Copy safe to show every player: while the game runs, only dead
    /// players keep their role. Revealed roles stay listed.
    pub fn public_view(&self) -> Game {
        let mut view = self.clone();
        if view.status != GameStatus::Finished {
            for player in view.players.iter_mut().filter(|p| p.is_alive) {
                player.role = None;
            }
        }
        view
    }

    pub fn reveal_role(&mut self, player_id: &str, reveal_type: RevealType) {
        let Some(role) = self.player(player_id).and_then(|p| p.role) else {
            return;
        };
        self.revealed_roles.push(RevealedRole {
            player_id: player_id.to_string(),
            role,
            reveal_day: self.current_day,
            reveal_type,
        });
    }
}
