//! Data models for API requests and responses.

use serde::{Deserialize, Serialize};

/// Optional serial port override for a connect request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    pub port: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// Error payload for rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
