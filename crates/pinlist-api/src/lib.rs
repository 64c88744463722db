pub mod auth;
pub mod error;
pub mod gate;
pub mod lists;
pub mod pins;
pub mod rate_limit;
pub mod routes;
pub mod tags;
pub mod workers;

pub use auth::{AppState, AppStateInner};
pub use routes::router;
