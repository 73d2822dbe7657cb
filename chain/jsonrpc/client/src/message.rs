//! JSON-RPC 2.0 envelopes.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Request {
            jsonrpc: "2.0",
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Error reported by the server or raised while talking to it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: String, data: Option<Value>) -> Self {
        RpcError { code, message, data }
    }

    /// The server could not be reached or answered with a transport-level failure.
    pub fn transport_error(message: String) -> Self {
        RpcError::new(-32_603, message, None)
    }

    /// The server answered with something that is not the expected payload.
    pub fn parse_error(message: String) -> Self {
        RpcError::new(-32_700, format!("Parse error: {message}"), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let request = Request::new("eth_blockNumber", serde_json::json!([]));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "eth_blockNumber");
        assert!(value["id"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn error_response() {
        let response: Response = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"could not decrypt key with given password"}}"#,
        )
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, -32000);
        assert!(err.to_string().contains("could not decrypt"));
    }

    #[test]
    fn null_result_is_not_an_error() {
        let response: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }
}
