pub mod config;
pub mod encode;
pub mod error;
pub mod metrics_consts;
pub mod parse;
pub mod pipeline;
pub mod router;
pub mod source;
pub mod stats;
pub mod store;
