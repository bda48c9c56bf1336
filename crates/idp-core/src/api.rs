//! Transport-agnostic HTTP routing for the query facade.
//!
//! Any HTTP server (or a function-as-a-service handler) translates its
//! request into an [`ApiRequest`] and writes back the [`ApiResponse`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::{ErrorKind, PipelineError};
use crate::facade::{InvoiceView, QueryFacade};

/// Headers attached to every facade response.
pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type"),
    ("Access-Control-Allow-Methods", "OPTIONS,GET,PUT"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: HashMap::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ApiResponse {
    fn new(status: u16, body: String) -> Self {
        Self {
            status,
            headers: CORS_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::new(status, body),
            Err(e) => {
                error!("Failed to encode response: {}", e);
                Self::new(500, json!({ "error": e.to_string() }).to_string())
            }
        }
    }

    pub fn from_error(err: &PipelineError) -> Self {
        let message = match err {
            PipelineError::InvalidRequest(message) => message.clone(),
            other => other.to_string(),
        };
        Self::new(err.status_code(), json!({ "error": message }).to_string())
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl QueryFacade {
    /// Route one request.
    ///
    /// `GET /upload-url` mints a grant, `OPTIONS` answers the preflight,
    /// and everything else lists invoices. Failures become JSON error
    /// bodies; nothing escapes as a panic or an `Err`.
    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        info!("API Request: {} {}", request.path, request.method);

        let method = request.method.to_ascii_uppercase();
        if method == "OPTIONS" {
            return ApiResponse::new(204, String::new());
        }

        if request.path == "/upload-url" && method == "GET" {
            return match self
                .request_upload_grant(request.param("filename"), request.param("contentType"))
                .await
            {
                Ok(grant) => ApiResponse::json(200, &grant),
                Err(e) => {
                    if e.kind() != ErrorKind::InvalidRequest {
                        error!("API Error: {}", e);
                    }
                    ApiResponse::from_error(&e)
                }
            };
        }

        match self.list_invoices().await {
            Ok(invoices) => {
                let views: Vec<InvoiceView> = invoices.iter().map(InvoiceView::from).collect();
                ApiResponse::json(200, &views)
            }
            Err(e) => {
                error!("API Error: {}", e);
                ApiResponse::from_error(&e)
            }
        }
    }
}
