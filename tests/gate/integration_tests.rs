//! End-to-end tests of the gate against stubbed provider APIs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::LIGHTNING_ADDRESS;
use super::TestHarness;
use lightning_gate::gate::INVOICE_FAILURE_PAYLOAD;
use lightning_gate::{admin, AccessStore, Error, PaymentRequest};

const X: &str = "6e6f737472706b31787878787878787878787878787878787878787878787878";
const Y: &str = "79797979797979797979797979797979797979797979797979797979797979ff";

fn phoenixd_invoice(payment_hash: &str) -> String {
    format!(
        r#"{{"amountSat":21,"paymentHash":"{payment_hash}","serialized":"lnbc210n1pjstubinvoice","expiresAt":4102444800000}}"#
    )
}

fn zbd_charge(id: &str, status: &str) -> String {
    format!(
        r#"{{"success":true,"data":{{"id":"{id}","amount":"21000","description":"Relay Access - pubkey:{X}","status":"{status}","invoice":{{"request":"lnbc210n1zbdstub"}},"expiresAt":"2100-01-01T00:00:00Z","confirmedAt":"2026-10-19T12:00:00Z"}}}}"#
    )
}

// =========================================================================
// phoenixd
// =========================================================================

#[tokio::test]
async fn test_phoenixd_not_found_is_unpaid() {
    let h = TestHarness::phoenixd().await.unwrap();

    let verification = h.gate.verify_payment("unknownhash", X).await.unwrap();

    assert!(!verification.paid);
    assert_eq!(verification.amount, 0);
    assert!(!h.gate.has_access(X));
}

#[tokio::test]
async fn test_phoenixd_server_error_grants_nothing() {
    let h = TestHarness::phoenixd().await.unwrap();
    h.stub
        .respond("GET", "/v1/payments/incoming/ph1", 500, "internal error");

    let err = h.gate.verify_payment("ph1", X).await.unwrap_err();

    assert!(matches!(err, Error::Provider(_)));
    assert!(!h.gate.has_access(X));
    assert_eq!(h.gate.stats().successful_payments, 0);
}

#[tokio::test]
async fn test_phoenixd_invoice_to_access() {
    let mut h = TestHarness::phoenixd().await.unwrap();
    h.stub
        .respond("POST", "/v1/createinvoice", 200, phoenixd_invoice("ph1"));

    let invoice = h.gate.create_invoice(X).await.unwrap();
    assert_eq!(invoice.payment_hash, "ph1");
    assert_eq!(invoice.amount, 21_000);
    assert!(invoice.expires_at.is_some());

    let sent = h.stub.requests_to("POST", "/v1/createinvoice");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].json()["amountSat"], 21);
    assert!(sent[0].json()["description"]
        .as_str()
        .unwrap()
        .contains(&format!("pubkey:{X}")));
    assert!(sent[0].headers["authorization"].starts_with("Basic "));

    // Provider later reports the invoice settled
    h.stub.respond(
        "GET",
        "/v1/payments/incoming/ph1",
        200,
        r#"{"paymentHash":"ph1","isPaid":true,"receivedSat":21,"completedAt":1760000000000}"#,
    );

    let before = h.gate.stats().successful_payments;
    let verification = h.gate.verify_payment(&invoice.payment_hash, X).await.unwrap();
    assert!(verification.paid);
    assert_eq!(verification.amount, 21_000);
    assert!(verification.paid_at.is_some());
    assert!(h.gate.has_access(X));
    assert_eq!(h.gate.stats().successful_payments, before + 1);

    // Grant survives a restart
    assert!(AccessStore::open(h.paid_access_file()).unwrap().has_access(X));
    h.restart().unwrap();
    assert!(h.gate.has_access(X));
}

#[tokio::test]
async fn test_phoenixd_hash_stays_inside_payment_path() {
    let h = TestHarness::phoenixd().await.unwrap();

    let verification = h
        .gate
        .verify_payment("../../v1/getbalance", X)
        .await
        .unwrap();

    assert!(!verification.paid);
    let sent = h.stub.requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].path.starts_with("/v1/payments/incoming/"));
    assert!(h.stub.requests_to("GET", "/v1/getbalance").is_empty());
}

#[tokio::test]
async fn test_gate_check_blocks_with_invoice() {
    let h = TestHarness::phoenixd().await.unwrap();
    h.stub
        .respond("POST", "/v1/createinvoice", 200, phoenixd_invoice("ph2"));

    let decision = h.gate.handle_gate_check(Y).await;
    assert!(decision.is_blocked());

    let request: PaymentRequest = serde_json::from_str(decision.payload()).unwrap();
    assert!(!request.invoice.is_empty());
    assert_eq!(request.amount, 21_000);
    assert_eq!(h.gate.stats().payment_requests, 1);
}

#[tokio::test]
async fn test_gate_check_fails_closed_when_provider_down() {
    let h = TestHarness::phoenixd().await.unwrap();
    h.stub
        .respond("POST", "/v1/createinvoice", 503, "unavailable");

    let decision = h.gate.handle_gate_check(Y).await;

    assert!(decision.is_blocked());
    assert_eq!(decision.payload(), INVOICE_FAILURE_PAYLOAD);
}

#[tokio::test]
async fn test_phoenixd_rejects_webhooks() {
    let h = TestHarness::phoenixd().await.unwrap();

    let err = admin::webhook(&h.gate, b"{}").unwrap_err();

    assert!(matches!(err, Error::WebhookUnsupported(_)));
    assert_eq!(admin::http_status(&err), 400);
}

// =========================================================================
// ZBD
// =========================================================================

#[tokio::test]
async fn test_zbd_charge_to_access_via_mapping() {
    let mut h = TestHarness::zbd().await.unwrap();
    h.stub
        .respond("POST", "/v0/charges", 200, zbd_charge("ch_1", "pending"));

    let invoice = h.gate.create_invoice(X).await.unwrap();
    assert_eq!(invoice.payment_request, "lnbc210n1zbdstub");
    assert_eq!(invoice.payment_hash.len(), 64);
    assert_eq!(h.gate.mapping_store().get(&invoice.payment_hash).as_deref(), Some("ch_1"));

    let sent = h.stub.requests_to("POST", "/v0/charges");
    assert_eq!(sent[0].headers["apikey"], "test-api-key");
    assert_eq!(sent[0].json()["amount"], "21000");

    // Still pending
    h.stub
        .respond("GET", "/v0/charges/ch_1", 200, zbd_charge("ch_1", "pending"));
    assert!(!h.gate.verify_payment(&invoice.payment_hash, X).await.unwrap().paid);

    h.stub
        .respond("GET", "/v0/charges/ch_1", 200, zbd_charge("ch_1", "completed"));
    let verification = h.gate.verify_payment(&invoice.payment_hash, X).await.unwrap();
    assert!(verification.paid);
    assert_eq!(verification.amount, 21_000);
    assert!(h.gate.has_access(X));
    assert_eq!(h.gate.stats().successful_payments, 1);

    // After a restart the charge id comes from the durable mapping store
    h.restart().unwrap();
    let verification = h.gate.verify_payment(&invoice.payment_hash, X).await.unwrap();
    assert!(verification.paid);
    assert_eq!(h.gate.stats().successful_payments, 0);
    assert_eq!(h.stub.requests_to("GET", "/v0/charges/ch_1").len(), 3);
}

#[tokio::test]
async fn test_zbd_unknown_hash_is_recoverable() {
    let h = TestHarness::zbd().await.unwrap();

    let err = h.gate.verify_payment("deadbeef", X).await.unwrap_err();

    assert!(matches!(err, Error::MappingNotFound(_)));
    assert!(err.is_recoverable());
    assert_eq!(admin::http_status(&err), 404);
    assert!(h.stub.requests().is_empty());
}

#[tokio::test]
async fn test_zbd_webhook_grants_access() {
    let h = TestHarness::zbd().await.unwrap();

    let body = format!(
        r#"{{"id":"ch_9","status":"completed","amount":"21000","description":"Relay Access - pubkey:{X}"}}"#
    );
    assert_eq!(admin::webhook(&h.gate, body.as_bytes()).unwrap(), "OK");

    assert!(h.gate.has_access(X));
    assert!(h.stub.requests().is_empty());

    let stats = admin::stats(&h.gate);
    assert_eq!(stats.successful_payments, 1);
    assert_eq!(stats.active_members, 1);
    assert_eq!(stats.provider, "ZBD");
    assert_eq!(stats.lightning_address.as_deref(), Some(LIGHTNING_ADDRESS));
}

#[tokio::test]
async fn test_zbd_webhook_and_verify_share_one_grant() {
    let h = TestHarness::zbd().await.unwrap();
    h.stub
        .respond("POST", "/v0/charges", 200, zbd_charge("ch_1", "pending"));
    let invoice = h.gate.create_invoice(X).await.unwrap();

    let body = format!(
        r#"{{"id":"ch_1","status":"completed","amount":"21000","description":"Relay Access - pubkey:{X}"}}"#
    );
    let record = h.gate.handle_webhook(body.as_bytes()).unwrap().unwrap();
    assert_eq!(record.payment_hash, invoice.payment_hash);
    assert_eq!(h.gate.stats().successful_payments, 1);

    // Manual verification of the same payment finds the webhook grant
    h.stub
        .respond("GET", "/v0/charges/ch_1", 200, zbd_charge("ch_1", "completed"));
    let verification = h.gate.verify_payment(&invoice.payment_hash, X).await.unwrap();
    assert!(verification.paid);
    assert_eq!(h.gate.stats().successful_payments, 1);

    // and refuses to hand it to someone else
    let err = h
        .gate
        .verify_payment(&invoice.payment_hash, Y)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PaymentAlreadyClaimed { .. }));
    assert!(!h.gate.has_access(Y));
}

#[tokio::test]
async fn test_zbd_pruned_mapping_no_longer_verifies() {
    let h = TestHarness::zbd().await.unwrap();
    h.stub
        .respond("POST", "/v0/charges", 200, zbd_charge("ch_3", "pending"));
    h.stub
        .respond("GET", "/v0/charges/ch_3", 200, zbd_charge("ch_3", "completed"));
    let invoice = h.gate.create_invoice(X).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let report = lightning_gate::Reconciler::new(
        std::sync::Arc::clone(h.gate.access_store()),
        std::sync::Arc::clone(h.gate.mapping_store()),
        std::time::Duration::from_secs(3600),
        chrono::Duration::zero(),
    )
    .with_provider(std::sync::Arc::clone(h.gate.provider()))
    .run_once();
    assert_eq!(report.mappings_pruned, 1);

    let err = h
        .gate
        .verify_payment(&invoice.payment_hash, X)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MappingNotFound(_)));
    assert!(h.stub.requests_to("GET", "/v0/charges/ch_3").is_empty());
}

#[tokio::test]
async fn test_admin_verify_round_trip() {
    let h = TestHarness::zbd().await.unwrap();
    h.stub
        .respond("POST", "/v0/charges", 200, zbd_charge("ch_2", "pending"));
    h.stub
        .respond("GET", "/v0/charges/ch_2", 200, zbd_charge("ch_2", "completed"));

    let invoice = h.gate.create_invoice(Y).await.unwrap();
    let body = format!(
        r#"{{"payment_hash":"{}","pubkey":"{Y}"}}"#,
        invoice.payment_hash
    );
    let response = admin::verify(&h.gate, body.as_bytes()).await.unwrap();

    assert!(response.paid);
    assert_eq!(response.access_granted, Some(true));
    assert!(h.gate.has_access(Y));
}
