pub mod activity_log;
pub mod session;
pub mod user;
