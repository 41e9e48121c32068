pub mod auth;
pub mod broker;
