pub mod action_service;
pub mod action_store;
pub mod backfill;
pub mod game_repository;
pub mod game_service;
pub mod phase_resolver;
pub mod role_assignment;
pub mod scheduler;
pub mod win_evaluator;
