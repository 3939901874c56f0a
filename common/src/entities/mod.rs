pub mod contact;
pub mod message;
pub mod newsletter;
pub mod project;
pub mod user;
