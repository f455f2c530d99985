pub mod app;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
