pub mod health;
pub mod items;
pub mod me;
pub mod reports;
pub mod token;
