pub mod blockchain_repository;
pub mod database;
pub mod models;

pub use blockchain_repository::{BlockchainRepository, TypeStats};
pub use database::Database;
pub use models::{BlockchainRecord, SenderLink};
