//! Infrastructure layer: settings and PostgreSQL adapters.

pub mod postgres;
pub mod settings;

pub use postgres::{PostgresStores, connect, migrate};
pub use settings::{LogFormat, Settings, SettingsError};
