pub mod auth;
pub mod cron;
