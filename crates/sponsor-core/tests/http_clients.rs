use std::sync::Arc;
use std::time::Duration;

use chain_sol::{build_create_associated_token_account, Address, Blockhash, Signature, Transaction};
use serde_json::json;
use sponsor_core::nullables::NullSigner;
use sponsor_core::{
    AccountState, ConfirmationStatus, ExternalSigner, HttpSigner, HttpSponsorLookup, Ledger,
    LedgerError, RpcLedger, SignRequest, SignerStatus, SponsorLookup, Submitter, TransferConfig,
    TransferError,
};
use tracing_subscriber::{fmt, EnvFilter};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn init_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn rpc_answering(body: serde_json::Value) -> (MockServer, RpcLedger) {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    let ledger = RpcLedger::new(server.uri(), "confirmed", Duration::from_secs(5)).unwrap();
    (server, ledger)
}

fn envelope(result: serde_json::Value) -> serde_json::Value {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result })
}

fn context(value: serde_json::Value) -> serde_json::Value {
    envelope(json!({ "context": { "slot": 250_000_000u64 }, "value": value }))
}

#[tokio::test]
async fn null_account_info_is_absent() {
    let (_server, ledger) = rpc_answering(context(json!(null))).await;
    let state = ledger.get_account_state(&Address::new([1; 32])).await.unwrap();
    assert_eq!(state, AccountState::Absent);
}

#[tokio::test]
async fn present_account_info_exists() {
    let (_server, ledger) = rpc_answering(context(json!({
        "lamports": 2039280,
        "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
        "data": ["", "base64"],
        "executable": false,
        "rentEpoch": 0
    })))
    .await;
    let state = ledger.get_account_state(&Address::new([1; 32])).await.unwrap();
    assert_eq!(state, AccountState::Exists);
}

#[tokio::test]
async fn http_failure_is_unavailable_not_absent() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let ledger = RpcLedger::new(server.uri(), "confirmed", Duration::from_secs(5)).unwrap();

    let err = ledger
        .get_account_state(&Address::new([1; 32]))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[tokio::test]
async fn latest_blockhash_is_parsed() {
    let expected = Blockhash::new([7; 32]);
    let (_server, ledger) = rpc_answering(context(json!({
        "blockhash": expected.to_string(),
        "lastValidBlockHeight": 300_000_000u64
    })))
    .await;
    assert_eq!(ledger.get_latest_blockhash().await.unwrap(), expected);
}

#[tokio::test]
async fn preflight_error_is_a_rejection() {
    let (_server, ledger) = rpc_answering(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": -32002, "message": "Transaction simulation failed: Blockhash not found" }
    }))
    .await;

    let err = ledger.send_raw_transaction(&[1, 2, 3]).await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::Rejected("Transaction simulation failed: Blockhash not found".into())
    );
}

#[tokio::test]
async fn accepted_send_returns_id() {
    let id = Signature::new([9; 64]);
    let (_server, ledger) = rpc_answering(envelope(json!(id.to_string()))).await;
    assert_eq!(ledger.send_raw_transaction(&[1, 2, 3]).await.unwrap(), id);
}

#[tokio::test]
async fn signature_status_mapping() {
    let id = Signature::new([9; 64]);

    let (_server, ledger) = rpc_answering(context(json!([null]))).await;
    assert_eq!(
        ledger.confirm_transaction(&id).await.unwrap(),
        ConfirmationStatus::Pending
    );

    let (_server, ledger) = rpc_answering(context(json!([{
        "slot": 1, "confirmations": 0, "err": null, "confirmationStatus": "processed"
    }])))
    .await;
    assert_eq!(
        ledger.confirm_transaction(&id).await.unwrap(),
        ConfirmationStatus::Pending
    );

    let (_server, ledger) = rpc_answering(context(json!([{
        "slot": 1, "confirmations": null, "err": null, "confirmationStatus": "finalized"
    }])))
    .await;
    assert_eq!(
        ledger.confirm_transaction(&id).await.unwrap(),
        ConfirmationStatus::Confirmed
    );

    let (_server, ledger) = rpc_answering(context(json!([{
        "slot": 1, "confirmations": null,
        "err": { "InstructionError": [0, { "Custom": 1 }] },
        "confirmationStatus": "confirmed"
    }])))
    .await;
    assert!(matches!(
        ledger.confirm_transaction(&id).await.unwrap(),
        ConfirmationStatus::Failed(_)
    ));
}

#[tokio::test]
async fn token_accounts_are_decoded() {
    let first = Address::new([3; 32]);
    let second = Address::new([4; 32]);
    let account = |address: &Address, amount: &str| {
        json!({
            "pubkey": address.to_string(),
            "account": {
                "data": {
                    "program": "spl-token",
                    "parsed": {
                        "type": "account",
                        "info": { "tokenAmount": { "amount": amount, "decimals": 6 } }
                    }
                },
                "lamports": 2039280
            }
        })
    };
    let (_server, ledger) = rpc_answering(context(json!([
        account(&first, "1500000"),
        account(&second, "250")
    ])))
    .await;

    let accounts = ledger
        .get_token_accounts_by_owner(&Address::new([1; 32]), &Address::new([2; 32]))
        .await
        .unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].address, first);
    assert_eq!(accounts[0].amount, 1_500_000);
    assert_eq!(accounts[1].amount, 250);
}

#[tokio::test]
async fn http_signer_sends_bearer_and_reads_signature() {
    init_logging();
    let server = MockServer::start().await;
    let signature_hex = "ab".repeat(64);
    Mock::given(method("POST"))
        .and(path("/sign"))
        .and(header("authorization", "Bearer sponsor-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "signature": signature_hex
        })))
        .expect(1)
        .mount(&server)
        .await;

    let signer = HttpSigner::new(
        format!("{}/sign", server.uri()),
        Some("sponsor-key".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    let response = signer
        .sign(SignRequest {
            message_hex: "0100".into(),
            memo: "Sponsor network fee".into(),
        })
        .await
        .unwrap();

    assert_eq!(response.status, SignerStatus::Success);
    assert_eq!(response.signature.as_deref(), Some(signature_hex.as_str()));
}

#[tokio::test]
async fn http_signer_error_status_is_not_transport_failure() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let signer = HttpSigner::new(server.uri(), None, Duration::from_secs(5)).unwrap();
    let response = signer
        .sign(SignRequest {
            message_hex: "0100".into(),
            memo: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(response.status, SignerStatus::Error);
}

#[tokio::test]
async fn sponsor_lookup_reads_address() {
    init_logging();
    let server = MockServer::start().await;
    let sponsor = Address::new([5; 32]);
    Mock::given(method("GET"))
        .and(path("/sponsor"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "address": sponsor.to_string()
        })))
        .mount(&server)
        .await;

    let lookup = HttpSponsorLookup::new(
        format!("{}/sponsor", server.uri()),
        Some("secret".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(lookup.sponsor_address().await.unwrap(), sponsor);
}

#[tokio::test]
async fn sponsor_lookup_rejection_is_reported() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let lookup = HttpSponsorLookup::new(server.uri(), None, Duration::from_secs(5)).unwrap();
    let err = lookup.sponsor_address().await.unwrap_err();
    assert!(matches!(err, TransferError::ParticipantUnavailable(_)));
}

fn signed_setup_transaction() -> Transaction {
    let sponsor = NullSigner::new(2);
    let ix = build_create_associated_token_account(
        &sponsor.address(),
        &Address::new([5; 32]),
        &Address::new([6; 32]),
    )
    .unwrap();
    let mut tx = Transaction::build(&sponsor.address(), &Blockhash::new([4; 32]), &[ix]).unwrap();
    let signature = sponsor.sign_message(&tx.message_bytes());
    tx.attach_signature(&sponsor.address(), signature).unwrap();
    tx
}

/// A node that takes `sendTransaction` but answers too late for the client.
async fn slow_send_node(status: serde_json::Value) -> MockServer {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "sendTransaction" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!(Signature::new([9; 64]).to_string())))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(context(json!([status]))))
        .mount(&server)
        .await;
    server
}

fn submitter_for(server: &MockServer) -> Submitter {
    let mut config = TransferConfig::new(server.uri(), USDC);
    config.confirmation_timeout_ms = 400;
    config.poll_interval_ms = 20;
    let ledger = RpcLedger::new(server.uri(), "confirmed", Duration::from_millis(100)).unwrap();
    Submitter::new(&config, Arc::new(ledger))
}

async fn send_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            serde_json::from_slice::<serde_json::Value>(&request.body)
                .map(|body| body["method"] == "sendTransaction")
                .unwrap_or(false)
        })
        .count()
}

#[tokio::test]
async fn timed_out_send_is_not_reported_as_retryable() {
    let server = slow_send_node(json!(null)).await;
    let tx = signed_setup_transaction();

    let err = submitter_for(&server).submit_and_confirm(&tx).await.unwrap_err();

    assert!(matches!(err, TransferError::ConfirmationTimedOut(id) if Some(id) == tx.id()));
    assert!(!err.is_retryable());
    assert_eq!(send_calls(&server).await, 1);
}

#[tokio::test]
async fn timed_out_send_that_landed_is_confirmed_by_polling() {
    let server = slow_send_node(json!({
        "slot": 1, "confirmations": null, "err": null, "confirmationStatus": "confirmed"
    }))
    .await;
    let tx = signed_setup_transaction();

    let id = submitter_for(&server).submit_and_confirm(&tx).await.unwrap();

    assert_eq!(Some(id), tx.id());
    assert_eq!(send_calls(&server).await, 1);
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    init_logging();
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{port}");
    let ledger = RpcLedger::new(url, "confirmed", Duration::from_secs(2)).unwrap();
    let err = ledger.send_raw_transaction(&[1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[tokio::test]
async fn unhealthy_node_is_unavailable_not_a_rejection() {
    let (_server, ledger) = rpc_answering(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {
            "code": -32005,
            "message": "Node is behind by 120 slots",
            "data": { "numSlotsBehind": 120 }
        }
    }))
    .await;

    let err = ledger.send_raw_transaction(&[1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

#[tokio::test]
async fn internal_error_on_send_is_indeterminate() {
    let (_server, ledger) = rpc_answering(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": -32603, "message": "Internal error" }
    }))
    .await;

    let err = ledger.send_raw_transaction(&[1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, LedgerError::Indeterminate(_)));
}
