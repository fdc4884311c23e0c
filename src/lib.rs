pub mod app;
pub mod auth;
pub mod carts;
pub mod classes;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod notify;
pub mod payments;
pub mod state;
pub mod store;
pub mod users;
