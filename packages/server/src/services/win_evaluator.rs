use serde::Serialize;

use crate::models::{game::Winner, player::Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameEndCheck {
    pub ended: bool,
    pub winner: Winner,
}

impl GameEndCheck {
    const ONGOING: GameEndCheck = GameEndCheck {
        ended: false,
        winner: Winner::None,
    };

    fn won_by(winner: Winner) -> Self {
        GameEndCheck {
            ended: true,
            winner,
        }
    }
}

pub fn check_game_end(players: &[Player]) -> GameEndCheck {
    let alive: Vec<&Player> = players.iter().filter(|p| p.is_alive).collect();
    let werewolves = alive.iter().filter(|p| p.is_werewolf()).count();
    let villager_side = alive.len() - werewolves;

    if alive.is_empty() {
        GameEndCheck::won_by(Winner::None)
    } else if werewolves == 0 {
        GameEndCheck::won_by(Winner::Villagers)
    } else if werewolves >= villager_side {
        GameEndCheck::won_by(Winner::Werewolves)
    } else {
        GameEndCheck::ONGOING
    }
}
