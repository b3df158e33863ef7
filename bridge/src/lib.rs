//! # Rule Bridge Library
//!
//! Persistence boundary and controller for extension automation rules.
//! Rules, profiles and groups live in a key-value store owned by a
//! background worker; the controller talks to it with bridge messages.

// Core modules
pub mod config;
pub mod controller;
pub mod errors;
pub mod management;
pub mod repository;
pub mod state;
pub mod storage;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::{BridgeConfig, ConfigError, StorageKeys};
pub use controller::{
    AlwaysConfirm, CommandOutcome, ConfirmationGate, ControllerError, RuleCommand, RuleController,
};
pub use errors::{ManagementError, PersistenceError};
pub use management::{InMemoryManagement, ManagementApi};
pub use repository::RuleRepository;
pub use state::AppState;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError, StoredValue};
pub use types::{BridgeMessage, BridgeReply, RuleSnapshot};
pub use worker::{BridgeHandle, StorageWorker};
