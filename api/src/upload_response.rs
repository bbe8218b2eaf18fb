use serde::{Deserialize, Serialize};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File processed and uploaded successfully.";

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub source_name: String,
    pub chunk_count: usize,
}
