//! JsonRpcClient against a local mock node
//!
//! A small axum server answers the three JSON-RPC methods the ledger uses,
//! so the request shapes and response decoding are exercised end to end.

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use txledger::chain::{ChainClient, JsonRpcClient, TokenReader};
use txledger::error::{ChainError, GatewayError};
use txledger::gateway::BalanceGateway;

const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
const CONTRACT: &str = "0x4444444444444444444444444444444444444444";
const REJECTED_PAYLOAD: &str = "0xdeadbeefdeadbeef";

async fn mock_node(Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let params = &request["params"];

    let outcome: Result<Value, Value> = match request["method"].as_str() {
        Some("eth_getBalance") if params[0] == ACCOUNT && params[1] == "latest" => {
            Ok(json!("0x8ac7230489e80000"))
        }
        Some("eth_call") => {
            let expected = format!("0x70a08231{:0>64}", &ACCOUNT[2..]);
            if params[0]["to"] == CONTRACT && params[0]["data"] == expected.as_str() {
                Ok(json!("0x0000000000000000000000000000000000000000000000004563918244f40000"))
            } else {
                Err(json!({"code": -32000, "message": "execution reverted"}))
            }
        }
        Some("eth_sendRawTransaction") if params[0] == REJECTED_PAYLOAD => {
            Err(json!({"code": -32000, "message": "nonce too low"}))
        }
        Some("eth_sendRawTransaction") => Ok(json!(
            "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b"
        )),
        _ => Err(json!({"code": -32601, "message": "method not found"})),
    };

    Json(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
    })
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn client() -> JsonRpcClient {
    let addr = spawn(Router::new().route("/", post(mock_node))).await;
    JsonRpcClient::new(format!("http://{}/", addr), CONTRACT, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_native_and_token_balances() {
    let rpc = client().await;
    assert_eq!(rpc.token_contract(), CONTRACT);
    assert_eq!(rpc.native_balance(ACCOUNT).await.unwrap(), "10000000000000000000");
    assert_eq!(rpc.token_balance(ACCOUNT).await.unwrap(), "5000000000000000000");
}

#[tokio::test]
async fn test_submit_returns_hash_or_rpc_error() {
    let rpc = client().await;
    let hash = rpc
        .submit_signed_transaction("0xf86c808504a817c80082520894")
        .await
        .unwrap();
    assert!(hash.starts_with("0x88df0164"));

    let err = rpc
        .submit_signed_transaction(REJECTED_PAYLOAD)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChainError::Rpc {
            code: -32000,
            message: "nonce too low".to_string(),
        }
    );
}

#[tokio::test]
async fn test_invalid_account_never_reaches_node() {
    let rpc = client().await;
    assert!(matches!(
        rpc.native_balance("0x1234").await,
        Err(ChainError::InvalidAccount(_))
    ));
    assert!(matches!(
        rpc.token_balance("not-an-account").await,
        Err(ChainError::InvalidAccount(_))
    ));
}

#[tokio::test]
async fn test_http_failures_are_transport_errors() {
    let addr = spawn(Router::new().route(
        "/",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "node overloaded") }),
    ))
    .await;
    let rpc = JsonRpcClient::new(format!("http://{}/", addr), CONTRACT, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        rpc.native_balance(ACCOUNT).await,
        Err(ChainError::Transport(_))
    ));

    let addr = spawn(Router::new().route("/", post(|| async { Json(json!({"jsonrpc": "2.0", "id": 1})) })))
        .await;
    let rpc = JsonRpcClient::new(format!("http://{}/", addr), CONTRACT, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        rpc.native_balance(ACCOUNT).await,
        Err(ChainError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_gateway_over_json_rpc() {
    let rpc = Arc::new(client().await);
    let gateway = BalanceGateway::new(rpc.clone(), rpc);

    let view = gateway
        .get_balances(ACCOUNT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(view.native_balance, "10000000000000000000");
    assert_eq!(view.token_balance, "5000000000000000000");

    let err = gateway
        .get_balances("0xabc", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::NativeBalance(ChainError::InvalidAccount(_))
            | GatewayError::TokenBalance(ChainError::InvalidAccount(_))
    ));
}
