//! Core of the workroute work-item routing engine.
//!
//! Classifications with per-domain overrides, workbaskets with one-hop
//! distribution targets, permission-scoped queries and task monitoring,
//! all on top of one SQLite-backed [`Engine`].

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod security;
pub mod service;

pub use config::{ConfigError, ConnectionManagementMode, EngineConfig};
pub use db::{Clock, ConnectionScope, DbError, DbResult, Engine, FixedClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::access::{AccessControlEntry, PermissionSet};
pub use model::classification::{Classification, ClassificationNode};
pub use model::task::{
    Attachment, ClassificationSummary, DueWorkbasketCount, NewAttachment, NewTask,
    ObjectReference, Task, TaskState, TaskStateCount,
};
pub use model::workbasket::{Workbasket, WorkbasketType};
pub use query::{ClassificationQuery, WorkbasketQuery};
pub use repo::{ClassificationFilter, Page, RepoError, RepoResult, WorkbasketFilter};
pub use security::{CallerIdentity, GroupPrincipal, IdentityContext};
pub use service::classification_service::ClassificationService;
pub use service::monitor_service::TaskMonitorService;
pub use service::task_service::TaskService;
pub use service::workbasket_service::WorkbasketService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Opens an engine from a TOML configuration file, initializing file logging
/// when the configuration has a `[logging]` section.
pub fn open_engine(
    database: impl AsRef<std::path::Path>,
    config_file: impl AsRef<std::path::Path>,
) -> Result<Engine, StartupError> {
    let config = EngineConfig::from_file(config_file).map_err(StartupError::Config)?;
    if let Some(logging) = &config.logging {
        init_logging(logging).map_err(StartupError::Logging)?;
    }
    Engine::open(database, config).map_err(StartupError::Db)
}

/// Failure while bringing up an engine from configuration.
#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Logging(LoggingError),
    Db(DbError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}
