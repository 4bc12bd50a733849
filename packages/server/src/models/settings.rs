use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::game::GamePhase;

pub const MIN_PLAYERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub werewolf_count: usize,
    pub seer_count: usize,
    pub bodyguard_count: usize,
    pub medium_count: usize,
    /// Length of the discussion phase.
    pub day_duration_seconds: u64,
    pub vote_duration_seconds: u64,
    pub night_duration_seconds: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("At least {MIN_PLAYERS} players are required, got {0}")]
    NotEnoughPlayers(usize),
    #[error("At least one werewolf is required")]
    NoWerewolves,
    #[error("{special} special roles do not fit a roster of {roster}")]
    TooManyRoles { special: usize, roster: usize },
    #[error("Phase durations must be greater than zero")]
    ZeroDuration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            werewolf_count: 1,
            seer_count: 1,
            bodyguard_count: 0,
            medium_count: 0,
            day_duration_seconds: 180,
            vote_duration_seconds: 60,
            night_duration_seconds: 90,
        }
    }
}

impl GameSettings {
    pub fn special_role_count(&self) -> usize {
        self.werewolf_count + self.seer_count + self.bodyguard_count + self.medium_count
    }

    pub fn validate(&self, roster_size: usize) -> Result<(), SettingsError> {
        if roster_size < MIN_PLAYERS {
            return Err(SettingsError::NotEnoughPlayers(roster_size));
        }
        if self.werewolf_count == 0 {
            return Err(SettingsError::NoWerewolves);
        }
        if self.special_role_count() > roster_size {
            return Err(SettingsError::TooManyRoles {
                special: self.special_role_count(),
                roster: roster_size,
            });
        }
        if self.day_duration_seconds == 0
            || self.vote_duration_seconds == 0
            || self.night_duration_seconds == 0
        {
            return Err(SettingsError::ZeroDuration);
        }
        Ok(())
    }

    pub fn phase_duration(&self, phase: GamePhase) -> Option<Duration> {
        let seconds = match phase {
            GamePhase::DayDiscussion => self.day_duration_seconds,
            GamePhase::DayVote => self.vote_duration_seconds,
            GamePhase::Night => self.night_duration_seconds,
            GamePhase::GameOver => return None,
        };
        Some(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_impossible_rosters() {
        let settings = GameSettings::default();
        assert_eq!(settings.validate(2), Err(SettingsError::NotEnoughPlayers(2)));
        assert!(settings.validate(5).is_ok());

        let crowded = GameSettings {
            werewolf_count: 2,
            seer_count: 1,
            bodyguard_count: 1,
            medium_count: 1,
            ..GameSettings::default()
        };
        assert_eq!(
            crowded.validate(4),
            Err(SettingsError::TooManyRoles {
                special: 5,
                roster: 4
            })
        );

        let no_wolves = GameSettings {
            werewolf_count: 0,
            ..GameSettings::default()
        };
        assert_eq!(no_wolves.validate(5), Err(SettingsError::NoWerewolves));
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: GameSettings =
            serde_json::from_str(r#"{"werewolf_count": 2, "vote_duration_seconds": 30}"#).unwrap();
        assert_eq!(settings.werewolf_count, 2);
        assert_eq!(settings.vote_duration_seconds, 30);
        assert_eq!(settings.day_duration_seconds, 180);
        assert_eq!(
            settings.phase_duration(GamePhase::DayVote),
            Some(Duration::from_secs(30))
        );
        assert_eq!(settings.phase_duration(GamePhase::GameOver), None);
    }
}
