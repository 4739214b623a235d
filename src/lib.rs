//! Store API: token-authenticated REST service over stores and the addresses and
//! opening hours they share.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod openapi;
pub mod payload;
pub mod query;
pub mod repo;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use error::{AppError, ConfigError};
pub use migration::{apply_migrations, ensure_database_exists};
pub use routes::{api_routes, app, common_routes};
pub use service::{CrudService, StoreService, TokenService};
pub use settings::Settings;
pub use state::AppState;
