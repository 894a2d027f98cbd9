//! # Market Gateway
//!
//! warp routes exposing the auction engine, the market rotator and direct
//! sales over HTTP/JSON.

pub mod error;
pub mod models;
pub mod rest_api;

pub use error::{handle_rejection, ApiError, ErrorDetail, ErrorResponse};
pub use rest_api::{create_routes, MarketApi};
