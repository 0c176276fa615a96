pub mod account;
pub mod actions;
pub mod recovery;
pub mod session;
