pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod routes;
pub mod session;
pub mod user_store;
