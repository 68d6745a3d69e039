//! Upload response body

use serde::{Deserialize, Serialize};

pub const NO_FILE_MESSAGE: &str       = "No file found!";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error!";

/// JSON answer of `/upload`; always sent with status 200
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadResponse {
    pub fn captions(results: Vec<String>) -> Self {
        Self { success: true, results: Some(results), message: None }
    }

    pub fn failure(message: &str) -> Self {
        Self { success: false, results: None, message: Some(message.to_string()) }
    }
}
