//! Provider gateway: family-specific responses normalized into
//! [`ProviderResult`](crate::types::ProviderResult) before anything
//! downstream sees them.

mod normalize;
mod response;

pub use normalize::{normalize_response, normalize_text, DEFAULT_AI_CONFIDENCE};
pub use response::*;
