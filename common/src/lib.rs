pub mod access_rules;
pub mod api;
pub mod auth;
pub mod constants;
pub mod entities;
pub mod error;
pub mod repository;
