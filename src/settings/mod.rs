// Persisted player configuration

pub mod settings;

pub use settings::{OutputSettings, PlayerSettings};
