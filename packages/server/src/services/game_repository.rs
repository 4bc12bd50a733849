use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::models::game::Game;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Storage for game aggregates. The engine loads a game at the start of each
/// operation and saves the whole aggregate once the operation succeeded.
pub trait GameRepository: Send + Sync {
    fn load(&self, game_id: &str) -> Result<Option<Game>, RepositoryError>;
    fn save(&self, game: &Game) -> Result<(), RepositoryError>;
    fn delete(&self, game_id: &str) -> Result<bool, RepositoryError>;
    fn list_ids(&self) -> Result<Vec<String>, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryGameRepository {
    games: RwLock<HashMap<String, Game>>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameRepository for InMemoryGameRepository {
    fn load(&self, game_id: &str) -> Result<Option<Game>, RepositoryError> {
        let games = self.games.read().unwrap_or_else(PoisonError::into_inner);
        Ok(games.get(game_id).cloned())
    }

    fn save(&self, game: &Game) -> Result<(), RepositoryError> {
        let mut games = self.games.write().unwrap_or_else(PoisonError::into_inner);
        games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    fn delete(&self, game_id: &str) -> Result<bool, RepositoryError> {
        let mut games = self.games.write().unwrap_or_else(PoisonError::into_inner);
        Ok(games.remove(game_id).is_some())
    }

    fn list_ids(&self) -> Result<Vec<String>, RepositoryError> {
        let games = self.games.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = games.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
