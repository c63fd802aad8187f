pub mod batch;
pub mod cache;
pub mod cli;
pub mod cog;
pub mod config;
pub mod contract;
pub mod error;
pub mod gdal;
pub mod index;
pub mod ledger;
pub mod load_config;
pub mod publish;
pub mod store;

pub use cli::{run, Cli, Commands};
