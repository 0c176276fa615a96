pub mod calldata;
pub mod user_operation;
