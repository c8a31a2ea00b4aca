//! Checkout from cart to logged transaction, with a scripted gateway in place
//! of the processor.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use gi_foundation_core::{ContactField, DonationPolicy, PaymentMethod, PaymentStatus, TransactionKind};
use gi_foundation_integration_tests::test_config;
use gi_foundation_storefront::cart::{CartStore, MemoryStorage, ProductRef};
use gi_foundation_storefront::checkout::{CheckoutError, CheckoutPhase, CheckoutSession, is_reference};
use gi_foundation_storefront::payments::{
    CardOutcome, ChargeRequest, NOT_COMPLETED_MESSAGE, PaymentError, PaymentGateway,
    PaymentReceipt, WebhookAction, parse_webhook, pay_with_card,
};
use gi_foundation_storefront::render::{CartRenderer, PanelState};
use gi_foundation_storefront::services::transactions::{TransactionLog, TransactionRecord};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde_json::json;

/// Answers charges from a script and remembers every request.
#[derive(Default)]
struct ScriptedGateway {
    answers: Mutex<VecDeque<Result<PaymentReceipt, PaymentError>>>,
    requests: Mutex<Vec<ChargeRequest>>,
}

impl ScriptedGateway {
    fn answering(answers: Vec<Result<PaymentReceipt, PaymentError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::default(),
        }
    }

    fn requests(&self) -> Vec<ChargeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl PaymentGateway for ScriptedGateway {
    fn charge(
        &self,
        request: ChargeRequest,
    ) -> impl Future<Output = Result<PaymentReceipt, PaymentError>> + Send {
        self.requests.lock().unwrap().push(request);
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PaymentError::Parse("no scripted answer".to_string())));
        async move { answer }
    }
}

fn receipt(id: &str, status: &str, amount_minor: i64) -> PaymentReceipt {
    PaymentReceipt {
        payment_id: id.to_string(),
        status: PaymentStatus::from_processor(status),
        amount_minor: Some(amount_minor),
        raw: json!({ "id": id, "status": status }),
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn filled_cart() -> CartStore {
    let mut cart = CartStore::load(Box::new(MemoryStorage::new()), DonationPolicy::default());
    cart.add_item(
        &ProductRef::new("hope-tee").with_title("Hope T-Shirt"),
        Some(dec("25")),
        2,
    );
    cart.add_item(
        &ProductRef::new("bracelet").with_title("Awareness Bracelet"),
        Some(dec("12.50")),
        1,
    );
    cart
}

fn open_checkout(cart: &CartStore) -> CheckoutSession {
    let mut rng = StdRng::seed_from_u64(7);
    CheckoutSession::open(cart, Utc::now(), &mut rng).unwrap()
}

fn fill_contact(session: &mut CheckoutSession) {
    session.update_field(ContactField::Name, "Maya Angelou");
    session.update_field(ContactField::Email, "maya@example.org");
    session.update_field(ContactField::Address, "100 Hope Street");
    session.update_field(ContactField::City, "Oakland");
    session.update_field(ContactField::State, "ca");
    session.update_field(ContactField::Zip, "94612");
}

#[tokio::test]
async fn test_card_checkout_is_logged_and_refund_updates_it() {
    let dir = tempfile::tempdir().unwrap();
    let log = TransactionLog::new(dir.path());

    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    assert!(is_reference(session.reference()));
    fill_contact(&mut session);
    let items = cart.items().to_vec();

    let gateway = ScriptedGateway::answering(vec![Ok(receipt("pay_123", "COMPLETED", 6250))]);
    let outcome = pay_with_card(&gateway, &mut session, &mut cart, "cnon:card-nonce-ok")
        .await
        .unwrap();

    let CardOutcome::Paid {
        intent, receipt, ..
    } = outcome
    else {
        panic!("expected a paid outcome");
    };
    assert_eq!(session.phase(), CheckoutPhase::Success);
    assert!(cart.is_empty());
    assert_eq!(receipt.email, "maya@example.org");

    let sent = gateway.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].amount_minor, 6250);
    assert_eq!(sent[0].buyer_email.as_deref(), Some("maya@example.org"));
    assert!(sent[0].note.as_deref().unwrap().contains(session.reference()));

    let record = TransactionRecord::from_checkout(&intent, &receipt, &items, "sandbox");
    log.append(&record).await.unwrap();

    let today = Utc::now().date_naive();
    let logged = log.records_for(today).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].kind, TransactionKind::ShopOrder);
    assert_eq!(logged[0].amount, dec("62.50"));
    assert_eq!(logged[0].items.len(), 2);
    assert_eq!(logged[0].square_payment_id.as_deref(), Some("pay_123"));
    assert!(log.orders_dir().read_dir().unwrap().next().is_some());

    let body = json!({
        "type": "refund.created",
        "data": { "object": { "refund": { "id": "ref_1", "payment_id": "pay_123" } } }
    });
    let actions = parse_webhook(body.to_string().as_bytes()).unwrap();
    let [WebhookAction::RefundCreated { payment_id, .. }] = actions.as_slice() else {
        panic!("expected one refund action, got {actions:?}");
    };
    assert!(log.update_status(payment_id, PaymentStatus::Refunded).await.unwrap());

    let logged = log.records_for(today).await.unwrap();
    assert_eq!(logged[0].status, PaymentStatus::Refunded);
    assert!(logged[0].updated_at.is_some());
}

#[tokio::test]
async fn test_decline_then_retry_keeps_reference() {
    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    fill_contact(&mut session);
    let reference = session.reference().to_string();

    let gateway = ScriptedGateway::answering(vec![
        Err(PaymentError::Declined("Card declined: insufficient funds".to_string())),
        Ok(receipt("pay_456", "APPROVED", 6250)),
    ]);

    let first = pay_with_card(&gateway, &mut session, &mut cart, "cnon:declined")
        .await
        .unwrap();
    let CardOutcome::Declined { message, .. } = first else {
        panic!("expected a decline");
    };
    assert_eq!(message, "Card declined: insufficient funds");
    assert_eq!(session.phase(), CheckoutPhase::Failed);
    assert_eq!(session.last_error(), Some("Card declined: insufficient funds"));
    assert_eq!(cart.item_count(), 3);
    assert_eq!(session.contact().name, "Maya Angelou");

    let second = pay_with_card(&gateway, &mut session, &mut cart, "cnon:ok")
        .await
        .unwrap();
    assert!(matches!(second, CardOutcome::Paid { .. }));
    assert_eq!(session.reference(), reference);
    assert!(session.last_error().is_none());

    let sent = gateway.requests();
    assert_eq!(sent.len(), 2);
    assert_ne!(sent[0].idempotency_key, sent[1].idempotency_key);
}

#[tokio::test]
async fn test_uncaptured_charge_is_a_failure() {
    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    fill_contact(&mut session);

    let gateway = ScriptedGateway::answering(vec![Ok(receipt("pay_789", "CANCELED", 6250))]);
    let outcome = pay_with_card(&gateway, &mut session, &mut cart, "cnon:ok")
        .await
        .unwrap();

    let CardOutcome::Declined { message, .. } = outcome else {
        panic!("expected a failure");
    };
    assert_eq!(message, NOT_COMPLETED_MESSAGE);
    assert!(!cart.is_empty());
}

#[tokio::test]
async fn test_cart_change_after_open_is_rechecked_before_charging() {
    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    fill_contact(&mut session);
    cart.set_donation("bracelet", "4");

    let gateway = ScriptedGateway::default();
    let err = pay_with_card(&gateway, &mut session, &mut cart, "cnon:ok")
        .await
        .unwrap_err();

    let CheckoutError::CartInvalid(blocked) = err else {
        panic!("expected the cart to block payment");
    };
    assert_eq!(blocked.focus_target().as_deref(), Some("donation-bracelet"));
    assert!(gateway.requests().is_empty());
    assert_eq!(session.phase(), CheckoutPhase::FormEntry);
}

#[test]
fn test_manual_transfer_renders_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = CartRenderer::new(test_config(dir.path()).payment_instructions());

    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    fill_contact(&mut session);
    let change = session.select_method(PaymentMethod::Zelle);
    assert!(!change.arm_card_widget);

    let mut panel = PanelState::default();
    panel.show_checkout();
    let before = renderer.render(&cart, Some(&session), &panel, &[]);
    let checkout = before.checkout.unwrap();
    assert!(checkout.method_panel.is_zelle);
    assert_eq!(checkout.method_panel.total, "$62.50");
    assert_eq!(checkout.method_panel.zelle_email, "give@gifoundation.test");
    assert_eq!(checkout.totals.tax.as_deref(), Some("$5.16"));

    let (intent, receipt) = session.confirm_manual_transfer(&mut cart).unwrap();
    assert_eq!(receipt.status, PaymentStatus::AwaitingTransfer);
    assert_eq!(intent.amount_minor, 6250);
    assert!(cart.is_empty());

    let after = renderer.render(&cart, Some(&session), &panel, &[]);
    let confirmation = after.checkout.unwrap().receipt.unwrap();
    assert!(confirmation.awaiting_transfer);
    assert_eq!(confirmation.amount, "$62.50");
    assert_eq!(confirmation.reference, session.reference());
    assert!(confirmation.payment_id.is_empty());
}

#[test]
fn test_card_selected_cannot_confirm_transfer() {
    let mut cart = filled_cart();
    let mut session = open_checkout(&cart);
    fill_contact(&mut session);

    assert_eq!(
        session.confirm_manual_transfer(&mut cart).unwrap_err(),
        CheckoutError::WrongMethod(PaymentMethod::Card)
    );
    assert!(!cart.is_empty());
}
