pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod google;
pub mod relay;
