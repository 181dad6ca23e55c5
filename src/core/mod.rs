pub mod config;
pub mod cors;
pub mod middleware;
pub mod shared;
