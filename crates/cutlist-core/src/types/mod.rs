//! Core types for cutlist.

mod options;
mod part;
mod progress;
mod result;

pub use options::*;
pub use part::*;
pub use progress::*;
pub use result::*;

use serde::{Deserialize, Serialize};

/// Authenticated caller, supplied by the auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    pub organization_id: String,
    pub user_id: String,
}

impl RequestIdentity {
    /// Create a new identity.
    pub fn new(organization_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: user_id.into(),
        }
    }
}
