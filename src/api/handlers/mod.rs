pub mod checkout;
pub mod cron;
pub mod public;
pub mod root;
