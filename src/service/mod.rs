//! Business logic between the HTTP handlers and the repositories.

pub mod auth;
mod crud;
pub mod reconcile;
mod stores;
pub mod validation;
pub use auth::TokenService;
pub use crud::CrudService;
pub use stores::StoreService;
pub use validation::RequestValidator;
