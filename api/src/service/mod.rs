pub mod auth;
pub mod contact;
pub mod mail;
pub mod message;
pub mod newsletter;
pub mod oauth;
pub mod project;
