//! JSON-RPC transport and the HTTP implementations of the connection traits.

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U256, U64};
use openpass_state::GasLimits;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::advanced::user_operation::UserOperation;
use crate::core::connection::{ChainConnection, RelayConnection, RelayError};
use crate::types::{FeeData, UserOperationReceipt};

#[derive(Debug, ThisError)]
pub enum RpcError {
    /// No usable answer: connection refused, timeout, non-JSON error page
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered but the result did not have the expected shape
    #[error("malformed RPC response: {0}")]
    Decode(String),
}

/// Minimal JSON-RPC 2.0 client over HTTP
pub struct JsonRpcClient {
    url: String,
    client: Client,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            request_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(url = %self.url, method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(RpcError::Decode(e.to_string())),
            Err(_) => return Err(RpcError::Transport(format!("HTTP {status}"))),
        };

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            debug!(method, id, code, %message, "rpc error");
            return Err(RpcError::Rpc { code, message });
        }

        let result = body.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

//=============================================================================
// Chain
//=============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    timestamp: U256,
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
}

/// [`ChainConnection`] over a node's JSON-RPC endpoint
pub struct HttpChain {
    rpc: JsonRpcClient,
}

impl HttpChain {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
        }
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    async fn latest_block(&self) -> Result<BlockHeader, RpcError> {
        let block: Option<BlockHeader> = self
            .rpc
            .request("eth_getBlockByNumber", ("latest", false))
            .await?;
        block.ok_or_else(|| RpcError::Decode("latest block missing".into()))
    }
}

#[async_trait]
impl ChainConnection for HttpChain {
    async fn chain_id(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
        let id: U64 = self.rpc.request("eth_chainId", json!([])).await?;
        Ok(id.as_u64())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Box<dyn Error + Send + Sync>> {
        let tx = json!({ "to": to, "data": data });
        Ok(self.rpc.request("eth_call", (tx, "latest")).await?)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, Box<dyn Error + Send + Sync>> {
        Ok(self.rpc.request("eth_getCode", (address, "latest")).await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, Box<dyn Error + Send + Sync>> {
        Ok(self.rpc.request("eth_getBalance", (address, "latest")).await?)
    }

    async fn fee_data(&self) -> Result<FeeData, Box<dyn Error + Send + Sync>> {
        let (block, priority, gas_price) = tokio::join!(
            self.latest_block(),
            self.rpc.request::<_, U256>("eth_maxPriorityFeePerGas", json!([])),
            self.rpc.request::<_, U256>("eth_gasPrice", json!([])),
        );

        let block = block?;
        // pre-London nodes reject the priority fee method
        let max_priority_fee_per_gas = match priority {
            Ok(fee) => Some(fee),
            Err(RpcError::Rpc { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(FeeData {
            base_fee_per_gas: block.base_fee_per_gas,
            max_priority_fee_per_gas,
            gas_price: gas_price?,
        })
    }

    async fn block_timestamp(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
        Ok(self.latest_block().await?.timestamp.low_u64())
    }
}

//=============================================================================
// Relay
//=============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionReceipt {
    transaction_hash: H256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserOperationReceipt {
    user_op_hash: H256,
    success: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    receipt: Option<RawTransactionReceipt>,
}

impl From<RpcError> for RelayError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(reason) => RelayError::Transport(reason),
            RpcError::Rpc { message, .. } => RelayError::Rejected(message),
            RpcError::Decode(reason) => RelayError::Rejected(format!("malformed relay response: {reason}")),
        }
    }
}

/// [`RelayConnection`] over an ERC-4337 bundler endpoint
pub struct HttpRelay {
    rpc: JsonRpcClient,
}

impl HttpRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
        }
    }
}

#[async_trait]
impl RelayConnection for HttpRelay {
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError> {
        Ok(self.rpc.request("eth_supportedEntryPoints", json!([])).await?)
    }

    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasLimits, RelayError> {
        Ok(self
            .rpc
            .request("eth_estimateUserOperationGas", (op, entry_point))
            .await?)
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError> {
        Ok(self.rpc.request("eth_sendUserOperation", (op, entry_point)).await?)
    }

    async fn get_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, RelayError> {
        let raw: Option<RawUserOperationReceipt> = self
            .rpc
            .request("eth_getUserOperationReceipt", [hash])
            .await?;

        Ok(raw.map(|r| UserOperationReceipt {
            user_op_hash: r.user_op_hash,
            success: r.success,
            reason: r.reason.filter(|reason| !reason.is_empty()),
            transaction_hash: r.receipt.map(|receipt| receipt.transaction_hash),
        }))
    }
}
