// Library interface for the batch payout tool
// Exposes public modules for testing

pub mod config;
pub mod explorer;
pub mod fee;
pub mod keys;
pub mod payout;
pub mod signer;
