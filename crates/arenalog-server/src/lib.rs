//! Read API over the tracker database, plus card-name enrichment.

pub mod enrich;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{listen, ServerConfig};
