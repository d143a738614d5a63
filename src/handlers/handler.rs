use serde::{Deserialize, Serialize};

/// Success envelope: `{"data": ...}`.
#[derive(Serialize, Deserialize, Debug)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        DataResponse { data }
    }
}

/// Failure envelope: `{"error": "..."}`.
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: String) -> Self {
        ErrorResponse { error }
    }
}
