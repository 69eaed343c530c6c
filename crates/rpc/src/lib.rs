//! HTTP API for the vault: accounts, uploads, records, access grants and
//! the pet listing.

mod auth;
mod files;
mod pets;
mod server;

pub use auth::{AuthUser, UserView};
pub use server::{build_router, start_server, ApiError, AppState, SharedState};
