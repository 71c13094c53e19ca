pub mod aggregator;
pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod net;
pub mod provider;
pub mod resolver;
pub mod store;
pub mod stream;

pub use engine::MarketEngine;
pub use errors::MarketDataError;
