//! HTTP surface: health and leaderboard endpoints

pub mod routes;

pub use routes::build_router;
