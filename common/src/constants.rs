use chrono::Duration;
use once_cell::sync::Lazy;

/// Lifetime of an issued session token.
pub static TOKEN_DURATION: Lazy<Duration> = Lazy::new(|| Duration::hours(2));

pub const DEFAULT_FRONTEND: &str = "http://localhost:5173";
pub const DEFAULT_BACKEND: &str = "http://localhost:5000";
