//! Infrastructure: configuration loaded from the environment.

pub mod settings;
