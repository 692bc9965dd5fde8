//! Person-search subject, consumed only through search fusion (§3).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{PersonId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

/// A named person whose `query_embedding` is the L2-normalized mean of its
/// READY reference-photo embeddings. Owned by a separate person-management
/// subsystem (out of scope, §1); this core only reads the vector.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Person {
    pub id: PersonId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub query_embedding: Option<Vec<f32>>,
    pub status: PersonStatus,
}

impl Person {
    pub fn is_searchable(&self) -> bool {
        self.status == PersonStatus::Ready && self.query_embedding.is_some()
    }
}
