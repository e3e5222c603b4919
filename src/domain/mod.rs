pub mod admin;
pub mod booking;
pub mod checkout;
pub mod course;
pub mod gift_card;
pub mod job;
pub mod money;
pub mod payment;
pub mod settings;
pub mod shop;

pub use admin::*;
pub use booking::*;
pub use checkout::*;
pub use course::*;
pub use gift_card::*;
pub use job::*;
pub use money::*;
pub use payment::*;
pub use settings::*;
pub use shop::*;
