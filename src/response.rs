//! Stable response shapes: entity object, paged list, delete acknowledgement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

impl Pagination {
    /// `total_pages = ceil(total / limit)`; zero limit yields zero pages.
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub data: Vec<Value>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: Value,
}

impl DeleteResponse {
    pub fn deleted(id: Value) -> Self {
        DeleteResponse { success: true, id }
    }
}
