pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod realtime;
pub mod routes;
pub mod schema;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
pub mod vault;

pub use routes::create_router;
pub use state::AppState;
