use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::ApiError;

/// Everything needed to dispatch a call, kept apart from `reqwest` so the
/// pipeline can rebuild a fresh request for its retry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// A successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.is_empty() {
            return Err(ApiError::MalformedResponse(format!(
                "Expected a JSON body, got an empty {} response",
                self.status
            )));
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::MalformedResponse(format!("Failed to parse JSON response: {}", e))
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = ApiRequest::get("/reports/monthly")
            .param("year", 2024)
            .query(vec![("x".into(), "y".into())]);
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.query,
            vec![("year".to_string(), "2024".to_string()), ("x".to_string(), "y".to_string())]
        );
        assert!(request.body.is_none());

        let request = ApiRequest::post("/accounts").json(&serde_json::json!({"name": "Cash"})).unwrap();
        assert_eq!(request.body, Some(serde_json::json!({"name": "Cash"})));
    }

    #[test]
    fn test_response_parsing() {
        let response = ApiResponse {
            status: StatusCode::OK,
            body: br#"{"totalBalance": 10.5, "currency": "BRL"}"#.to_vec(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["currency"], "BRL");

        let garbage = ApiResponse {
            status: StatusCode::OK,
            body: b"<html>".to_vec(),
        };
        assert!(matches!(garbage.json::<serde_json::Value>(), Err(ApiError::MalformedResponse(_))));

        let empty = ApiResponse {
            status: StatusCode::NO_CONTENT,
            body: Vec::new(),
        };
        assert!(empty.is_empty());
        assert!(matches!(
            empty.json::<serde_json::Value>(),
            Err(ApiError::MalformedResponse(msg)) if msg.contains("empty")
        ));
    }
}
