pub mod config;
pub mod error;
pub mod finality;
pub mod http;
pub mod listeners;
pub mod models;
pub mod pipeline;
pub mod prices;
pub mod query;
pub mod reconciler;
pub mod repository;
pub mod scheduler;
pub mod selector;
