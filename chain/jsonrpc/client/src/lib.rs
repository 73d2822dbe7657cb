use consortium_network_configs::Address;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use std::time::Duration;

pub use message::{Request, Response, RpcError};
pub use types::{TransactionReceipt, TransactionRequest};

mod message;
mod types;

/// Timeout for a single request, connection included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Max size of the payload JsonRpcClient can receive.
const PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

pub type RpcRequest<T> = BoxFuture<'static, Result<T, RpcError>>;

/// Prepare a `RpcRequest` with a given client, server address, method and parameters.
fn call_method<P, R>(client: &Client, server_addr: &str, method: &str, params: P) -> RpcRequest<R>
where
    P: serde::Serialize,
    R: serde::de::DeserializeOwned + 'static,
{
    let params = serde_json::to_value(&params);
    let method = method.to_string();
    let client = client.clone();
    let server_addr = server_addr.to_string();

    async move {
        let params = params.map_err(|err| {
            RpcError::parse_error(format!("could not serialize params of {method}: {err}"))
        })?;
        let request = Request::new(method, params);
        let response = client
            .post(&server_addr)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| RpcError::transport_error(format!("{server_addr}: {err}")))?;

        let bytes = read_limited(response).await?;

        let response: Response = serde_json::from_slice(&bytes).map_err(|err| {
            RpcError::parse_error(format!("{err} in {:?}", String::from_utf8_lossy(&bytes)))
        })?;
        serde_json::from_value(response.into_result()?)
            .map_err(|err| RpcError::parse_error(format!("failed to parse result: {err}")))
    }
    .boxed()
}

fn payload_too_large(size: usize) -> RpcError {
    RpcError::parse_error(format!(
        "response payload too large: {size} bytes, limit: {PAYLOAD_LIMIT} bytes"
    ))
}

/// Reads the response body, giving up as soon as it exceeds `PAYLOAD_LIMIT`.
async fn read_limited(mut response: reqwest::Response) -> Result<Vec<u8>, RpcError> {
    if let Some(length) = response.content_length() {
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        if length > PAYLOAD_LIMIT {
            return Err(payload_too_large(length));
        }
    }
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|err| {
        RpcError::transport_error(format!("failed to retrieve payload: {err}"))
    })? {
        if bytes.len() + chunk.len() > PAYLOAD_LIMIT {
            return Err(payload_too_large(bytes.len() + chunk.len()));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// JsonRPC client that uses reqwest for HTTP transport
#[derive(Clone)]
pub struct JsonRpcClient {
    pub server_addr: String,
    pub client: Client,
}

impl JsonRpcClient {
    /// Creates a new RPC client backed by reqwest HTTP client
    pub fn new(server_addr: &str, client: Client) -> Self {
        JsonRpcClient { server_addr: server_addr.to_string(), client }
    }

    /// Unlocks `account` for signing for `duration_secs` seconds.
    pub fn unlock_account(
        &self,
        account: Address,
        passphrase: &str,
        duration_secs: u64,
    ) -> RpcRequest<bool> {
        call_method(
            &self.client,
            &self.server_addr,
            "personal_unlockAccount",
            (account, passphrase, duration_secs),
        )
    }

    /// Submits a transaction signed by the node and returns its hash.
    pub fn send_transaction(&self, tx: TransactionRequest) -> RpcRequest<String> {
        call_method(&self.client, &self.server_addr, "eth_sendTransaction", [tx])
    }

    /// `None` while the transaction is pending.
    pub fn transaction_receipt(&self, tx_hash: &str) -> RpcRequest<Option<TransactionReceipt>> {
        call_method(&self.client, &self.server_addr, "eth_getTransactionReceipt", [tx_hash])
    }
}

fn create_client() -> Result<Client, RpcError> {
    Client::builder()
        .timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(|err| RpcError::transport_error(format!("failed to create HTTP client: {err}")))
}

/// Create new JSON RPC client that connects to the given address.
pub fn new_client(server_addr: &str) -> Result<JsonRpcClient, RpcError> {
    Ok(JsonRpcClient::new(server_addr, create_client()?))
}
