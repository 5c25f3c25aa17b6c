pub mod cli;
pub mod config;
pub mod db;
pub mod detect;
pub mod feature;
pub mod index;
mod metrics;
pub mod server;
pub mod suggest;
pub mod utils;

pub use config::Opts;
pub use index::FeatureIndex;
