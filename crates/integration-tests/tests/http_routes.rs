//! Route tests against the full router: pages, cart fragments, the
//! checkout panel flow, payment API validation and webhooks.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::Utc;
use gi_foundation_core::{PaymentStatus, TransactionKind};
use gi_foundation_integration_tests::{TestApp, sign_webhook};
use gi_foundation_storefront::services::transactions::TransactionRecord;
use serde_json::json;

const CONTACT: [(&str, &str); 6] = [
    ("name", "Maya Lopez"),
    ("email", "maya@example.org"),
    ("address", "123 Main Street"),
    ("city", "Oakland"),
    ("state", "CA"),
    ("zip", "94612"),
];

/// Cart with one tee and an open checkout.
async fn open_checkout(app: &mut TestApp) {
    let added = app.post_form("/cart/add", &[("id", "hope-tee")]).await;
    assert_eq!(added.status, StatusCode::OK);
    let opened = app.post_form("/checkout/open", &[]).await;
    assert_eq!(opened.status, StatusCode::OK);
    assert!(opened.body.contains("id=\"checkout-panel\""));
}

async fn fill_contact(app: &mut TestApp) {
    for (field, value) in CONTACT {
        let response = app
            .post_form("/checkout/field", &[("field", field), ("value", value)])
            .await;
        assert_eq!(response.status, StatusCode::OK, "field {field}");
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let mut app = TestApp::new();
    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body, "ok");
    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);

    let mut missing = TestApp::with_catalog(None);
    assert_eq!(missing.get("/health").await.status, StatusCode::OK);
    assert_eq!(
        missing.get("/health/ready").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_home_page_headers() {
    let mut app = TestApp::new();
    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Hope T-Shirt"));
    let csp = response.header("content-security-policy").unwrap();
    assert!(csp.contains("nonce-"));
    assert!(response.header("x-request-id").is_some());
}

#[tokio::test]
async fn test_product_pages() {
    let mut app = TestApp::new();

    let index = app.get("/products").await;
    assert_eq!(index.status, StatusCode::OK);
    assert!(index.body.contains("Awareness Bracelet"));
    assert!(index.body.contains("General Donation"));

    let show = app.get("/products/hope-tee").await;
    assert_eq!(show.status, StatusCode::OK);
    assert!(show.body.contains("Hope T-Shirt"));
    assert!(show.body.contains("name=\"option_0\""));

    assert_eq!(app.get("/products/unknown").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_outage_is_unavailable() {
    let mut app = TestApp::with_catalog(Some("{ not json"));
    assert_eq!(app.get("/products").await.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_add_to_cart_fragments() {
    let mut app = TestApp::new();
    let response = app.post_form("/cart/add", &[("id", "hope-tee")]).await;

    assert_eq!(response.status, StatusCode::OK);
    let triggers = response.triggers();
    assert!(triggers.get("itemAdded").is_some());
    assert!(triggers.get("cartUpdated").is_some());
    assert!(response.body.contains("hx-swap-oob"));
    assert!(response.body.contains("id=\"cart-count\""));

    let count = app.get("/cart/count").await;
    assert_eq!(count.status, StatusCode::OK);
    assert!(count.body.contains(">1</span>"));

    // A new browser has its own cart.
    app.new_visitor();
    let count = app.get("/cart/count").await;
    assert!(count.body.contains("cart-count--empty"));
}

#[tokio::test]
async fn test_add_rejects_bad_ids() {
    let mut app = TestApp::new();
    assert_eq!(
        app.post_form("/cart/add", &[("id", "no-such-thing")]).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.post_form("/cart/add", &[("quantity", "2")]).await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_checkout_blocked_until_donation_entered() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", &[("id", "general-donation")]).await;

    let blocked = app.post_form("/checkout/open", &[]).await;
    assert_eq!(blocked.status, StatusCode::OK);
    let detail = &blocked.triggers()["checkoutBlocked"];
    assert_eq!(detail["focus"], "donation-general-donation");
    assert_eq!(detail["itemId"], "general-donation");
    assert_eq!(detail["message"], "General Donation: Enter a donation amount");
    assert!(!blocked.body.contains("id=\"checkout-panel\""));

    let donated = app
        .post_form(
            "/cart/donation",
            &[("id", "general-donation"), ("donation", "25")],
        )
        .await;
    assert_eq!(donated.status, StatusCode::OK);
    assert!(donated.triggers().get("itemDonationUpdated").is_some());

    let opened = app.post_form("/checkout/open", &[]).await;
    assert!(opened.triggers().get("checkoutBlocked").is_none());
    assert!(opened.body.contains("id=\"checkout-panel\""));
}

#[tokio::test]
async fn test_donation_keystroke_leaves_input_alone() {
    let mut app = TestApp::new();
    app.post_form(
        "/cart/add",
        &[("id", "awareness-bracelet"), ("quantity", "2")],
    )
    .await;

    let typing = app
        .post_form(
            "/cart/donation",
            &[
                ("id", "awareness-bracelet"),
                ("donation", "12"),
                ("caret", "2"),
                ("focused", "true"),
            ],
        )
        .await;
    assert_eq!(typing.status, StatusCode::OK);
    assert!(!typing.body.contains("id=\"donation-awareness-bracelet\""));
    assert!(!typing.body.contains("id=\"cart-sidebar\""));
    assert!(typing.body.contains("id=\"line-total-awareness-bracelet\""));
    assert!(typing.body.contains("id=\"mobile-line-total-awareness-bracelet\""));
    assert!(typing.body.contains("id=\"cart-footer\""));
    assert!(typing.body.contains("id=\"cart-count\""));
    assert!(typing.body.contains("$24.00"));

    let short = app
        .post_form(
            "/cart/donation",
            &[
                ("id", "awareness-bracelet"),
                ("donation", "5"),
                ("caret", "1"),
                ("focused", "true"),
            ],
        )
        .await;
    assert!(short.body.contains("Minimum donation is $10"));
    assert!(short.body.contains("aria-disabled=\"true\""));
    assert!(!short.body.contains("id=\"donation-awareness-bracelet\""));

    // Leaving the input re-renders it with the stored amount.
    let blurred = app
        .post_form(
            "/cart/donation",
            &[("id", "awareness-bracelet"), ("donation", "12")],
        )
        .await;
    assert!(blurred.body.contains("id=\"cart-sidebar\""));
    assert!(blurred.body.contains("id=\"donation-awareness-bracelet\""));
    assert!(blurred.body.contains("value=\"12.00\""));
}

#[tokio::test]
async fn test_empty_cart_cannot_check_out() {
    let mut app = TestApp::new();
    let blocked = app.post_form("/checkout/open", &[]).await;
    assert_eq!(blocked.triggers()["checkoutBlocked"]["message"], "Your cart is empty");
}

#[tokio::test]
async fn test_validate_gate_points_at_first_field() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;

    let gate = app.post_form("/checkout/validate", &[]).await;
    assert_eq!(gate.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = gate.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["field"], "name");
    assert_eq!(body["focus"], "checkout-name");
    assert_eq!(body["message"], "Please enter your full name");

    fill_contact(&mut app).await;
    let gate = app.post_form("/checkout/validate", &[]).await;
    assert_eq!(gate.status, StatusCode::OK);
    assert_eq!(gate.json()["ok"], true);
}

#[tokio::test]
async fn test_validate_without_checkout_conflicts() {
    let mut app = TestApp::new();
    let gate = app.post_form("/checkout/validate", &[]).await;
    assert_eq!(gate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_first_dismiss_after_checkout_is_swallowed() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;

    let first = app.post_form("/cart/dismiss", &[("source", "outside")]).await;
    assert_eq!(first.status, StatusCode::NO_CONTENT);

    let second = app.post_form("/cart/dismiss", &[("source", "escape")]).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.body.contains("hx-swap-oob"));

    // Already closed.
    let third = app.post_form("/cart/dismiss", &[("source", "outside")]).await;
    assert_eq!(third.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_layout_rerenders_only_on_breakpoint_change() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", &[("id", "awareness-bracelet")]).await;

    let wide = app.post_form("/cart/layout", &[("width", "1280")]).await;
    assert_eq!(wide.status, StatusCode::NO_CONTENT);

    let narrow = app.post_form("/cart/layout", &[("width", "500")]).await;
    assert_eq!(narrow.status, StatusCode::OK);
    assert!(narrow.body.contains("id=\"cart-overlay\""));

    let same = app.post_form("/cart/layout", &[("width", "768")]).await;
    assert_eq!(same.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_card_widget_armed_once_per_opening() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", &[("id", "hope-tee")]).await;

    // Card is the default method, so the opening arms the widget.
    let opened = app.post_form("/checkout/open", &[]).await;
    let detail = &opened.triggers()["paymentMethodChanged"];
    assert_eq!(detail["method"], "card");
    assert_eq!(detail["armCardWidget"], true);
    assert!(opened.body.contains("hx-preserve=\"true\""));

    let cashapp = app.post_form("/checkout/method", &[("method", "cashapp")]).await;
    assert_eq!(cashapp.status, StatusCode::OK);
    let detail = &cashapp.triggers()["paymentMethodChanged"];
    assert_eq!(detail["method"], "cashapp");
    assert_eq!(detail["armCardWidget"], false);
    assert!(cashapp.body.contains("$GIFoundation"));

    let card = app.post_form("/checkout/method", &[("method", "card")]).await;
    assert_eq!(card.triggers()["paymentMethodChanged"]["method"], "card");
    assert_eq!(card.triggers()["paymentMethodChanged"]["armCardWidget"], false);

    // Reopening the kept checkout does not arm again.
    app.post_form("/cart/close", &[]).await;
    let reopened = app.post_form("/checkout/open", &[]).await;
    assert!(reopened.body.contains("id=\"checkout-panel\""));
    assert!(reopened.triggers().get("paymentMethodChanged").is_none());

    // A new opening does.
    app.post_form("/checkout/cancel", &[]).await;
    let fresh = app.post_form("/checkout/open", &[]).await;
    assert_eq!(fresh.triggers()["paymentMethodChanged"]["armCardWidget"], true);
}

#[tokio::test]
async fn test_dismissing_payment_error_returns_to_form() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;
    fill_contact(&mut app).await;

    // The processor is unreachable, so the charge is declined.
    let declined = app
        .post_form("/checkout/pay", &[("token", "cnon:card-nonce-ok")])
        .await;
    assert_eq!(declined.status, StatusCode::OK);
    assert!(declined.triggers().get("paymentFailed").is_some());
    assert!(declined.body.contains("id=\"payment-error\""));
    assert!(declined.body.contains("class=\"checkout__error\""));

    let dismissed = app.post_form("/checkout/dismiss-error", &[]).await;
    assert_eq!(dismissed.status, StatusCode::OK);
    assert!(
        dismissed
            .body
            .contains(r#"<div id="modal-root" hx-swap-oob="innerHTML"></div>"#)
    );
    assert!(dismissed.body.contains("id=\"checkout-panel\""));
    assert!(!dismissed.body.contains("class=\"checkout__error\""));
    assert!(!dismissed.body.contains("id=\"payment-error\""));

    // Nothing left to dismiss; the modal is still cleared.
    let again = app.post_form("/checkout/dismiss-error", &[]).await;
    assert_eq!(again.status, StatusCode::OK);
    assert!(again.body.contains("id=\"modal-root\""));
}

#[tokio::test]
async fn test_huge_donation_keeps_cart_usable() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", &[("id", "general-donation")]).await;

    let huge = app
        .post_form(
            "/cart/donation",
            &[
                ("id", "general-donation"),
                ("donation", "79228162514264337593543950335"),
                ("caret", "29"),
                ("focused", "true"),
            ],
        )
        .await;
    assert_eq!(huge.status, StatusCode::OK);
    assert!(huge.body.contains("Maximum donation is $1,000,000"));

    let largest = app
        .post_form(
            "/cart/donation",
            &[("id", "general-donation"), ("donation", "1000000")],
        )
        .await;
    assert_eq!(largest.status, StatusCode::OK);
    let doubled = app
        .post_form(
            "/cart/quantity",
            &[("id", "general-donation"), ("quantity", "2")],
        )
        .await;
    assert_eq!(doubled.status, StatusCode::OK);
    assert!(doubled.body.contains("$2000000.00"));
    assert_eq!(app.get("/cart/count").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_confirm_transfer_logs_awaiting_record() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;
    fill_contact(&mut app).await;
    app.post_form("/checkout/method", &[("method", "zelle")]).await;

    let confirmed = app.post_form("/checkout/confirm-transfer", &[]).await;
    assert_eq!(confirmed.status, StatusCode::OK);
    assert!(confirmed.body.contains("Thank you for your donation"));
    assert!(confirmed.triggers().get("cartCleared").is_some());

    let records = app
        .state()
        .transactions()
        .records_for(Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::AwaitingTransfer);
    assert_eq!(records[0].kind, TransactionKind::ShopOrder);
    assert_eq!(records[0].customer.as_ref().unwrap().email, "maya@example.org");

    let count = app.get("/cart/count").await;
    assert!(count.body.contains("cart-count--empty"));
}

#[tokio::test]
async fn test_confirm_transfer_with_missing_fields_reports_invalid() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;
    app.post_form("/checkout/method", &[("method", "cashapp")]).await;

    let response = app.post_form("/checkout/confirm-transfer", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.triggers()["checkoutInvalid"]["focus"], "checkout-name");
}

#[tokio::test]
async fn test_pay_requires_token() {
    let mut app = TestApp::new();
    open_checkout(&mut app).await;
    let response = app.post_form("/checkout/pay", &[("token", "  ")]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_config_and_charge_validation() {
    let mut app = TestApp::new();

    let config = app.get("/api/payments/config").await;
    assert_eq!(config.status, StatusCode::OK);
    let body = config.json();
    assert_eq!(body["app_id"], "sandbox-sq0idb-test");
    assert_eq!(body["location_id"], "LTEST123");
    assert_eq!(body["environment"], "sandbox");

    let missing_token = app
        .post_json("/api/payments/charge", &json!({ "amount": 2500 }))
        .await;
    assert_eq!(missing_token.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_token.json()["error"], "Missing payment token");

    let zero = app
        .post_json(
            "/api/payments/charge",
            &json!({ "token": "cnon:card-nonce-ok", "amount": 0 }),
        )
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_requires_signature() {
    let mut app = TestApp::new();
    let body = br#"{"type":"payment.updated"}"#.to_vec();

    let unsigned = app.post_raw("/api/payments/webhook", &[], body.clone()).await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

    let forged = app
        .post_raw(
            "/api/payments/webhook",
            &[("x-square-hmacsha256-signature", "c2lnbmF0dXJl")],
            body,
        )
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_updates_logged_payment() {
    let mut app = TestApp::new();
    let record = TransactionRecord::from_charge(
        TransactionKind::Donation,
        "pay_webhook_1",
        PaymentStatus::Pending,
        2500,
        None,
        "sandbox",
    );
    app.state().transactions().append(&record).await.unwrap();

    let body = serde_json::to_vec(&json!({
        "type": "payment.updated",
        "event_id": "evt_1",
        "data": {
            "type": "payment",
            "id": "pay_webhook_1",
            "object": { "payment": {
                "id": "pay_webhook_1",
                "status": "COMPLETED",
                "amount_money": { "amount": 2500, "currency": "USD" }
            }}
        }
    }))
    .unwrap();
    let signature = sign_webhook(&body);

    let response = app
        .post_raw(
            "/api/payments/webhook",
            &[("x-square-hmacsha256-signature", signature.as_str())],
            body,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let records = app
        .state()
        .transactions()
        .records_for(record.timestamp.date_naive())
        .await
        .unwrap();
    assert_eq!(records[0].status, PaymentStatus::Completed);
    assert!(records[0].updated_at.is_some());
}

#[tokio::test]
async fn test_signed_garbage_is_bad_request() {
    let mut app = TestApp::new();
    let body = b"not json".to_vec();
    let signature = sign_webhook(&body);
    let response = app
        .post_raw(
            "/api/payments/webhook",
            &[("x-square-hmacsha256-signature", signature.as_str())],
            body,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
