pub mod action;
pub mod chat;
pub mod game;
pub mod player;
pub mod role;
pub mod settings;
