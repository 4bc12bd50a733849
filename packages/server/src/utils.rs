pub mod clock;
pub mod config;
pub mod random;
pub mod test_setup;
