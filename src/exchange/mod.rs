//! Venue Exchange Layer
//!
//! REST order directory, request signing and the push-event feed.

pub mod auth;
pub mod feed;
pub mod rest;
pub mod traits;
pub mod types;

pub use auth::VenueAuth;
pub use feed::{channels_for, CentrifugeFeed};
pub use rest::VenueRestClient;
pub use traits::{Identity, OrderDirectory};
pub use types::*;
