// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP chain client with ordered backend fallback.
//!
//! The client holds an ordered list of backend endpoints. Every operation
//! walks the list in order for a bounded number of rounds: transient
//! failures (timeout, connect error, 5xx, rate limit) rotate to the next
//! backend, hard rejections surface immediately, and an operation a backend
//! does not offer simply rotates. The fallback order is configuration data,
//! not control flow.
//!
//! Two backend dialects are recognized: the REST dialect (`/v2/accounts/…`)
//! and the legacy RPC dialect (`/api/v2/…` with an `ok`/`result` envelope).
//! Broadcast goes through the RPC dialect, which returns the message hash;
//! status probes go through the REST dialect.

use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};

use super::client::{ChainClient, ChainError, IncomingTransfer, TxStatus};
use crate::wallet::WalletAddress;

/// Per-request timeout. Timeouts classify as transient: the request may
/// have succeeded server-side even though the response was lost.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How many times the full backend list is walked before giving up.
const RETRY_ROUNDS: usize = 2;

/// Backend API dialect, inferred from the endpoint host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    /// REST dialect: `/v2/accounts/{addr}`, bearer-token auth.
    Rest,
    /// Legacy RPC dialect: `/api/v2/…` with an `ok`/`result` envelope.
    Rpc,
}

#[derive(Debug, Clone)]
struct Backend {
    base: String,
    kind: BackendKind,
}

impl Backend {
    fn new(base: &str) -> Self {
        let kind = if base.contains("toncenter") {
            BackendKind::Rpc
        } else {
            BackendKind::Rest
        };
        Self {
            base: base.trim_end_matches('/').to_string(),
            kind,
        }
    }
}

/// HTTP-backed [`ChainClient`].
pub struct HttpChainClient {
    http: reqwest::Client,
    backends: Vec<Backend>,
    api_key: Option<String>,
}

impl HttpChainClient {
    /// Build a client over the given ordered endpoint list.
    pub fn new(endpoints: &[String], api_key: Option<String>) -> Result<Self, ChainError> {
        if endpoints.is_empty() {
            return Err(ChainError::InvalidResponse(
                "no chain backends configured".to_string(),
            ));
        }
        for endpoint in endpoints {
            endpoint
                .parse::<url::Url>()
                .map_err(|e| ChainError::InvalidResponse(format!("bad endpoint {endpoint}: {e}")))?;
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            backends: endpoints.iter().map(|e| Backend::new(e)).collect(),
            api_key,
        })
    }

    /// Walk the backend list for up to [`RETRY_ROUNDS`] rounds.
    async fn with_backends<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T, ChainError>
    where
        F: Fn(Backend) -> Fut,
        Fut: std::future::Future<Output = Result<T, ChainError>>,
    {
        let mut last = String::from("no backend attempted");
        for round in 0..RETRY_ROUNDS {
            for backend in &self.backends {
                match call(backend.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(
                            op,
                            backend = %backend.base,
                            round,
                            error = %e,
                            "chain backend failed, rotating"
                        );
                        last = e.to_string();
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Err(ChainError::AllBackendsFailed(format!("{op}: {last}")))
    }

    async fn get_json(&self, url: &str) -> Result<Value, ChainError> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_reqwest)?;
        read_json(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChainError> {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_reqwest)?;
        read_json(response).await
    }

    /// Unwrap the legacy RPC `ok`/`result` envelope.
    fn rpc_result(value: Value) -> Result<Value, ChainError> {
        if value.get("ok").and_then(Value::as_bool) == Some(true) {
            value
                .get("result")
                .cloned()
                .ok_or_else(|| ChainError::InvalidResponse("missing result field".to_string()))
        } else {
            let detail = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error");
            Err(ChainError::Rejected(detail.to_string()))
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_balance(&self, address: &WalletAddress) -> Result<u64, ChainError> {
        self.with_backends("get_balance", |backend| async move {
            match backend.kind {
                BackendKind::Rest => {
                    let url = format!("{}/v2/accounts/{}", backend.base, address);
                    let data = self.get_json(&url).await?;
                    data.get("balance")
                        .and_then(value_as_u64)
                        .ok_or_else(|| missing_field("balance"))
                }
                BackendKind::Rpc => {
                    let url = format!(
                        "{}/api/v2/getAddressBalance?address={}",
                        backend.base, address
                    );
                    let result = Self::rpc_result(self.get_json(&url).await?)?;
                    value_as_u64(&result).ok_or_else(|| missing_field("result"))
                }
            }
        })
        .await
    }

    async fn get_sequence_number(&self, address: &WalletAddress) -> Result<u32, ChainError> {
        self.with_backends("get_sequence_number", |backend| async move {
            match backend.kind {
                BackendKind::Rest => {
                    let url = format!(
                        "{}/v2/blockchain/accounts/{}/methods/seqno",
                        backend.base, address
                    );
                    match self.get_json(&url).await {
                        Ok(data) => parse_seqno_stack(&data),
                        // An account with no state yet has no seqno method.
                        Err(ChainError::Rejected(detail)) if detail.contains("404") => Ok(0),
                        Err(e) => Err(e),
                    }
                }
                BackendKind::Rpc => {
                    let url = format!("{}/api/v2/runGetMethod", backend.base);
                    let body = json!({
                        "address": address.to_string(),
                        "method": "seqno",
                        "stack": [],
                    });
                    let result = Self::rpc_result(self.post_json(&url, &body).await?)?;
                    if result.get("exit_code").and_then(Value::as_i64) != Some(0) {
                        return Ok(0); // uninitialized account
                    }
                    parse_seqno_stack(&result)
                }
            }
        })
        .await
    }

    async fn broadcast(&self, boc: &[u8]) -> Result<String, ChainError> {
        let encoded = Base64::encode_string(boc);
        self.with_backends("broadcast", |backend| {
            let encoded = encoded.clone();
            async move {
                match backend.kind {
                    // The REST dialect accepts messages but does not echo an
                    // id back; broadcasting goes through the RPC dialect.
                    BackendKind::Rest => Err(ChainError::Transient(
                        "backend does not report broadcast ids".to_string(),
                    )),
                    BackendKind::Rpc => {
                        let url = format!("{}/api/v2/sendBoc", backend.base);
                        let result =
                            Self::rpc_result(self.post_json(&url, &json!({ "boc": encoded })).await?)?;
                        match &result {
                            Value::String(hash) => Ok(hash.clone()),
                            Value::Object(obj) => obj
                                .get("hash")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .ok_or_else(|| missing_field("hash")),
                            _ => Err(missing_field("hash")),
                        }
                    }
                }
            }
        })
        .await
    }

    async fn get_transaction_status(&self, tx_id: &str) -> Result<TxStatus, ChainError> {
        self.with_backends("get_transaction_status", |backend| async move {
            match backend.kind {
                BackendKind::Rest => {
                    let url = format!("{}/v2/blockchain/transactions/{}", backend.base, tx_id);
                    match self.get_json(&url).await {
                        Ok(data) => Ok(parse_tx_status(&data)),
                        Err(ChainError::Rejected(detail)) if detail.contains("404") => {
                            Ok(TxStatus::NotFound)
                        }
                        Err(e) => Err(e),
                    }
                }
                BackendKind::Rpc => Err(ChainError::Transient(
                    "backend does not support status probes".to_string(),
                )),
            }
        })
        .await
    }

    async fn list_incoming_transfers(
        &self,
        address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<IncomingTransfer>, ChainError> {
        self.with_backends("list_incoming_transfers", |backend| async move {
            match backend.kind {
                BackendKind::Rest => {
                    let url = format!(
                        "{}/v2/accounts/{}/transactions?limit={}",
                        backend.base, address, limit
                    );
                    let data = self.get_json(&url).await?;
                    let txs = data
                        .get("transactions")
                        .and_then(Value::as_array)
                        .ok_or_else(|| missing_field("transactions"))?;
                    Ok(txs.iter().filter_map(parse_incoming).collect())
                }
                BackendKind::Rpc => {
                    let url = format!(
                        "{}/api/v2/getTransactions?address={}&limit={}&archival=true",
                        backend.base, address, limit
                    );
                    let result = Self::rpc_result(self.get_json(&url).await?)?;
                    let txs = result
                        .as_array()
                        .ok_or_else(|| missing_field("result"))?;
                    Ok(txs.iter().filter_map(parse_incoming_rpc).collect())
                }
            }
        })
        .await
    }
}

/// Map a reqwest failure into the transient/permanent taxonomy.
fn classify_reqwest(err: reqwest::Error) -> ChainError {
    if err.is_timeout() || err.is_connect() {
        ChainError::Transient(err.to_string())
    } else {
        ChainError::Rejected(err.to_string())
    }
}

/// Read a response body, classifying HTTP status codes.
async fn read_json(response: reqwest::Response) -> Result<Value, ChainError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ChainError::Transient(detail))
    } else {
        Err(ChainError::Rejected(detail))
    }
}

fn missing_field(name: &str) -> ChainError {
    ChainError::InvalidResponse(format!("missing {name} field"))
}

/// Accept both numeric and decimal-string encodings of amounts.
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse the first stack entry of a `seqno` get-method result. Backends
/// disagree on the entry shape: `{"num": "0x5"}`, `{"value": 5}`, or a
/// `["num", "0x5"]` pair.
fn parse_seqno_stack(data: &Value) -> Result<u32, ChainError> {
    if let Some(state) = data.pointer("/decoded/state").and_then(value_as_u64) {
        return Ok(state as u32);
    }
    let entry = data
        .get("stack")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .ok_or_else(|| missing_field("stack"))?;
    let raw = match entry {
        Value::Object(obj) => obj.get("num").or_else(|| obj.get("value")),
        Value::Array(pair) => pair.get(1),
        _ => None,
    }
    .ok_or_else(|| missing_field("stack entry"))?;

    let parsed = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hexpart) = s.strip_prefix("0x") {
                u64::from_str_radix(hexpart, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    };
    parsed
        .map(|v| v as u32)
        .ok_or_else(|| ChainError::InvalidResponse(format!("unparsable seqno: {raw}")))
}

/// A transaction that is visible on chain counts as accepted unless the
/// backend explicitly marks it aborted or unsuccessful.
fn parse_tx_status(data: &Value) -> TxStatus {
    let aborted = data.get("aborted").and_then(Value::as_bool) == Some(true);
    let success = data.get("success").and_then(Value::as_bool);
    if aborted || success == Some(false) {
        TxStatus::Failed
    } else {
        TxStatus::Accepted
    }
}

/// Parse one REST-dialect transaction into an incoming transfer.
/// Outgoing and zero-value entries yield `None`.
fn parse_incoming(tx: &Value) -> Option<IncomingTransfer> {
    let tx_id = tx.get("hash").and_then(Value::as_str)?.to_string();
    let in_msg = tx.get("in_msg")?;
    let amount = in_msg.get("value").and_then(value_as_u64)?;
    if amount == 0 {
        return None;
    }
    let source = in_msg
        .get("source")
        .map(|s| match s {
            Value::Object(obj) => obj
                .get("address")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Value::String(addr) => addr.clone(),
            _ => String::new(),
        })
        .unwrap_or_default();
    Some(IncomingTransfer {
        tx_id,
        source,
        amount,
        comment: extract_comment_bytes(in_msg),
    })
}

/// Parse one RPC-dialect transaction into an incoming transfer.
fn parse_incoming_rpc(tx: &Value) -> Option<IncomingTransfer> {
    let tx_id = tx
        .pointer("/transaction_id/hash")
        .and_then(Value::as_str)?
        .to_string();
    let in_msg = tx.get("in_msg")?;
    let amount = in_msg.get("value").and_then(value_as_u64)?;
    if amount == 0 {
        return None;
    }
    let source = in_msg
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(IncomingTransfer {
        tx_id,
        source,
        amount,
        comment: extract_comment_bytes(in_msg),
    })
}

/// Pull the raw comment bytes out of an incoming message. Transports are
/// not uniform: some expose decoded text, others a base64 payload that may
/// still carry the opcode tag (the deposit scanner strips it).
fn extract_comment_bytes(in_msg: &Value) -> Vec<u8> {
    for pointer in ["/decoded_body/text", "/decoded_body/comment", "/comment"] {
        if let Some(text) = in_msg.pointer(pointer).and_then(Value::as_str) {
            if !text.is_empty() {
                return text.as_bytes().to_vec();
            }
        }
    }
    for pointer in ["/msg_data/text", "/msg_data/body", "/message", "/body"] {
        if let Some(encoded) = in_msg.pointer(pointer).and_then(Value::as_str) {
            if let Ok(bytes) = Base64::decode_vec(encoded) {
                if !bytes.is_empty() {
                    return bytes;
                }
            }
            if !encoded.is_empty() {
                return encoded.as_bytes().to_vec();
            }
        }
    }
    Vec::new()
}
