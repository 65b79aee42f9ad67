//! Authentication utilities for the marketplace API

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Generate HMAC-SHA256 signature for API requests
///
/// # Arguments
/// * `secret` - API secret key (base64 encoded)
/// * `timestamp` - Unix timestamp in seconds
/// * `method` - HTTP method (GET, POST, etc.)
/// * `request_path` - API endpoint path
/// * `body` - Request body (empty string for GET requests)
pub fn sign_request(
    secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String> {
    let secret_bytes = BASE64
        .decode(secret)
        .map_err(|e| EngineError::Authentication(format!("failed to decode secret: {}", e)))?;

    // Message to sign: timestamp + method + path + body
    let message = format!(
        "{}{}{}{}",
        timestamp,
        method.to_uppercase(),
        request_path,
        body
    );

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| EngineError::Authentication(format!("failed to create HMAC: {}", e)))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Generate authentication headers for API requests
pub fn generate_auth_headers(
    api_key: &str,
    api_secret: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<AuthHeaders> {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign_request(api_secret, timestamp, method, request_path, body)?;

    Ok(AuthHeaders {
        api_key: api_key.to_string(),
        signature,
        timestamp,
    })
}

/// Authentication headers for API requests
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: i64,
}

impl AuthHeaders {
    /// Add authentication headers to a reqwest RequestBuilder
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-MARKET-KEY", &self.api_key)
            .header("X-MARKET-SIGNATURE", &self.signature)
            .header("X-MARKET-TIMESTAMP", self.timestamp.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_request_produces_hex() {
        let secret = BASE64.encode(b"test_secret_key_12345");
        let result = sign_request(&secret, 1234567890, "GET", "/account/balance", "");

        assert!(result.is_ok());
        let signature = result.unwrap();
        assert!(!signature.is_empty());
        assert!(hex::decode(&signature).is_ok());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let secret = BASE64.encode(b"test_secret_key_12345");
        let a = sign_request(&secret, 1234567890, "get", "/market/search", "").unwrap();
        let b = sign_request(&secret, 1234567890, "GET", "/market/search", "").unwrap();
        assert_eq!(a, b, "method casing must not change the signature");

        let c = sign_request(&secret, 1234567891, "GET", "/market/search", "").unwrap();
        assert_ne!(a, c, "timestamp must change the signature");
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let result = sign_request("not base64 !!!", 1234567890, "GET", "/", "");
        assert!(matches!(result, Err(EngineError::Authentication(_))));
    }

    #[test]
    fn test_generate_auth_headers() {
        let secret = BASE64.encode(b"test_secret_key_12345");
        let result = generate_auth_headers("test_api_key", &secret, "GET", "/test", "");

        assert!(result.is_ok());
        let headers = result.unwrap();
        assert_eq!(headers.api_key, "test_api_key");
        assert!(!headers.signature.is_empty());
    }
}
