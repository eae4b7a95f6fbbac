//! In-process stand-in for a Hardhat node, served over real HTTP on an
//! ephemeral port so the reqwest client is exercised end to end.

use crate::rpc::{parse_quantity, to_quantity, RpcClient};
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct MockState {
    /// (method, params, id) in arrival order
    pub calls: Vec<(String, Value, u64)>,
    pub block_number: u64,
    pub chain_id: u64,
    pub automine: bool,
    pub interval: Value,
    pub snapshots: Vec<String>,
    /// (lowercased `to`, calldata) -> hex return data
    pub call_results: HashMap<(String, String), String>,
    /// Methods that answer with an RPC error
    pub failing: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            block_number: 0,
            chain_id: 31337,
            automine: true,
            interval: json!(0),
            snapshots: Vec::new(),
            call_results: HashMap::new(),
            failing: Vec::new(),
        }
    }
}

pub type SharedMock = Arc<Mutex<MockState>>;

pub struct MockNode {
    pub addr: SocketAddr,
    pub state: SharedMock,
}

impl MockNode {
    pub async fn start() -> Self {
        let state: SharedMock = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .route("/", post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> RpcClient {
        RpcClient::new(self.url(), Duration::from_secs(5)).unwrap()
    }

    pub async fn calls(&self) -> Vec<(String, Value, u64)> {
        self.state.lock().await.calls.clone()
    }

    pub async fn methods(&self) -> Vec<String> {
        self.calls().await.into_iter().map(|c| c.0).collect()
    }

    pub async fn fail(&self, method: &str) {
        self.state.lock().await.failing.push(method.to_string());
    }

    pub async fn set_call_result(&self, to: &str, data: &str, result: &str) {
        self.state
            .lock()
            .await
            .call_results
            .insert((to.to_lowercase(), data.to_string()), result.to_string());
    }
}

async fn handle(State(state): State<SharedMock>, Json(body): Json<Value>) -> Json<Value> {
    let id = body["id"].as_u64().unwrap_or(0);
    let method = body["method"].as_str().unwrap_or_default().to_string();
    let params = body["params"].clone();

    let mut s = state.lock().await;
    s.calls.push((method.clone(), params.clone(), id));

    let outcome = if s.failing.contains(&method) {
        Err((-32603, format!("{} failed", method)))
    } else {
        dispatch(&mut s, &method, &params)
    };

    Json(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    })
}

fn dispatch(s: &mut MockState, method: &str, params: &Value) -> Result<Value, (i64, String)> {
    match method {
        "eth_blockNumber" => Ok(json!(to_quantity(s.block_number))),
        "eth_chainId" => Ok(json!(to_quantity(s.chain_id))),
        "hardhat_getAutomine" => Ok(json!(s.automine)),
        "evm_setAutomine" => {
            s.automine = params[0].as_bool().unwrap_or(s.automine);
            Ok(json!(true))
        }
        "evm_setIntervalMining" => {
            s.interval = params[0].clone();
            Ok(json!(true))
        }
        "evm_mine" => {
            s.block_number += 1;
            Ok(json!("0x0"))
        }
        "hardhat_mine" => {
            let count = params[0]
                .as_str()
                .and_then(|q| parse_quantity(q).ok())
                .unwrap_or(1);
            s.block_number += count;
            Ok(json!(true))
        }
        "evm_snapshot" => {
            let id = to_quantity(s.snapshots.len() as u64 + 1);
            s.snapshots.push(id.clone());
            Ok(json!(id))
        }
        "evm_revert" => {
            let id = params[0].as_str().unwrap_or_default();
            match s.snapshots.iter().position(|snap| snap == id) {
                Some(pos) => {
                    s.snapshots.truncate(pos);
                    Ok(json!(true))
                }
                None => Ok(json!(false)),
            }
        }
        "hardhat_reset" => {
            s.block_number = params[0]["forking"]["blockNumber"].as_u64().unwrap_or(0);
            s.automine = true;
            s.interval = json!(0);
            Ok(json!(true))
        }
        "eth_call" => {
            let to = params[0]["to"].as_str().unwrap_or_default().to_lowercase();
            let data = params[0]["data"].as_str().unwrap_or_default().to_string();
            s.call_results
                .get(&(to, data))
                .map(|r| json!(r))
                .ok_or((-32000, "execution reverted".to_string()))
        }
        other => Err((-32601, format!("Method not found: {}", other))),
    }
}
