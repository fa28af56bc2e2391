mod api;
mod auth;
mod chat;
mod primitives;
mod serde_helpers;

// Re-export all types
pub use api::*;
pub use auth::*;
pub use chat::*;
pub use primitives::*;

// Keep serde_helpers internal but accessible within crate
pub(crate) use serde_helpers::{
    lenient_array, lenient_bool, lenient_decimal, lenient_string, lenient_timestamp, lenient_u64,
};
