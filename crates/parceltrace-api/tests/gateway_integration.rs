//! In-process HTTP tests of the gateway: registration through the CA
//! bridge, session auth, the order→delivery bridge, the custody flow, and
//! the failure envelope.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use parceltrace_api::{create_router, event_bus, ApiConfig, AppState, EventConsumer, GatewayRegistry};
use parceltrace_auth::{JwtAuthenticator, JwtConfig, JwtService, PasswordService};
use parceltrace_ca::{
    generate_enrollment_secret, CertificateAuthority, DevCa, RegistrationRequest,
};
use parceltrace_ledger::{EmbeddedLedger, LedgerService, LedgerTimeouts, Signer};
use parceltrace_store::MemoryStore;
use parceltrace_types::{CertAttributes, Organization, Role};
use parceltrace_wallet::Wallet;

struct TestEnv {
    server: TestServer,
    state: Arc<AppState>,
}

async fn start_gateway(org_name: Option<Organization>) -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let wallet_dir = std::env::temp_dir().join(format!(
        "parceltrace-gateway-test-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ));
    let wallet = Arc::new(Wallet::open(wallet_dir, "an-adequately-long-test-secret").unwrap());
    let ledger = Arc::new(EmbeddedLedger::new("custody-channel", "delivery"));

    let mut cas: HashMap<Organization, Arc<dyn CertificateAuthority>> = HashMap::new();
    for org in Organization::ALL {
        let ca = Arc::new(DevCa::new(org));
        let root = ca.root_public_key().await.unwrap();
        ledger.register_trust_root(org.msp_id(), &root).unwrap();
        cas.insert(org, ca);
    }

    // The consumer's service identity is an org admin.
    let platform_ca = cas.get(&Organization::Platform).unwrap();
    let secret = generate_enrollment_secret();
    platform_ca
        .register(RegistrationRequest {
            enrollment_id: "gateway-admin".to_string(),
            secret: secret.clone(),
            affiliation: Organization::Platform.name().to_string(),
            attributes: CertAttributes {
                user_id: "gateway-admin".to_string(),
                role: Role::Admin,
                company_id: None,
                company_name: None,
            },
        })
        .await
        .unwrap();
    let admin = platform_ca.enroll("gateway-admin", &secret).await.unwrap();
    let service_signer = Arc::new(Signer::new(admin.certificate, &admin.private_key).unwrap());

    let jwt = JwtService::new(JwtConfig {
        secret: "an-adequately-long-test-jwt-secret".to_string(),
        expires_in: Duration::from_secs(3600),
        issuer: "parceltrace-gateway".to_string(),
    });
    let events = event_bus();
    let consumer_healthy = Arc::new(AtomicBool::new(false));
    let _consumer_task = EventConsumer::new(
        ledger.clone(),
        service_signer,
        events.clone(),
        consumer_healthy.clone(),
    )
    .spawn();

    let ledger_service: Arc<dyn LedgerService> = ledger;
    let state = Arc::new(AppState {
        store: store.clone(),
        wallet: wallet.clone(),
        cas,
        gateways: GatewayRegistry::new(
            wallet,
            ledger_service,
            LedgerTimeouts::default(),
            64,
            Duration::from_secs(900),
        ),
        jwt: jwt.clone(),
        passwords: PasswordService::new(),
        authenticator: Arc::new(JwtAuthenticator::new(jwt)),
        events,
        consumer_healthy,
        config: ApiConfig { org_name, max_subscriptions_per_socket: 64 },
    });

    let server = TestServer::new(create_router(state.clone())).unwrap();
    TestEnv { server, state }
}

async fn register_and_login(env: &TestEnv, username: &str, role: &str) -> (String, String) {
    let response = env
        .server
        .post("/api/v1/auth/register")
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "a strong password!",
            "role": role,
            "fullName": format!("{} Person", username),
            "address": "42 Test Lane, Springfield",
        }))
        .await;
    assert_eq!(response.status_code(), 201, "register {}: {}", username, response.text());
    let body: Value = response.json();
    let user_id = body["data"]["userId"].as_str().unwrap().to_string();

    let response = env
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "username": username, "password": "a strong password!" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let token = body["data"]["token"].as_str().unwrap().to_string();
    (user_id, token)
}

fn bearer(token: &str) -> axum::http::HeaderValue {
    axum::http::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

#[tokio::test]
async fn register_login_and_wallet_entry() {
    let env = start_gateway(None).await;
    let (user_id, _token) = register_and_login(&env, "alice", "CUSTOMER").await;

    // Registration sealed an identity into the wallet.
    assert!(env.state.wallet.exists(&user_id).unwrap());
    let identity = env.state.wallet.get(&user_id).unwrap().unwrap();
    assert_eq!(identity.organization, Organization::Platform);
}

#[tokio::test]
async fn requests_without_token_are_unauthenticated() {
    let env = start_gateway(None).await;
    let response = env.server.get("/api/v1/deliveries/my").await;
    assert_eq!(response.status_code(), 401);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn single_org_gateway_rejects_foreign_roles() {
    let env = start_gateway(Some(Organization::Sellers)).await;
    let response = env
        .server
        .post("/api/v1/auth/register")
        .json(&json!({
            "username": "carol",
            "email": "carol@example.com",
            "password": "a strong password!",
            "role": "CUSTOMER",
            "fullName": "Carol",
        }))
        .await;
    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_AUTHORIZED");
}

#[tokio::test]
async fn order_confirmation_creates_a_delivery() {
    let env = start_gateway(None).await;
    let (seller_id, seller_token) = register_and_login(&env, "sam-seller", "SELLER").await;
    let (_customer_id, customer_token) = register_and_login(&env, "cass-customer", "CUSTOMER").await;

    // Seller lists an item.
    let response = env
        .server
        .post("/api/v1/shop-items")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "name": "Ceramic mug",
            "description": "Stoneware, 350ml",
            "priceCents": 1800,
            "quantityAvailable": 25,
        }))
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    let item: Value = response.json();
    let item_id = item["data"]["itemId"].as_str().unwrap();

    // Customer orders it.
    let response = env
        .server
        .post("/api/v1/orders")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .json(&json!({
            "sellerId": seller_id,
            "items": [{"itemId": item_id, "quantity": 2}],
        }))
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    let order: Value = response.json();
    let order_id = order["data"]["orderId"].as_str().unwrap();

    // Seller confirms; the delivery appears on the ledger.
    let response = env
        .server
        .post(&format!("/api/v1/orders/{}/confirm", order_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "packageWeight": 2.5,
            "packageLength": 30.0,
            "packageWidth": 20.0,
            "packageHeight": 15.0,
            "city": "New York", "state": "NY", "country": "US",
        }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let delivery: Value = response.json();
    assert_eq!(delivery["data"]["deliveryStatus"], "PENDING_PICKUP");
    let delivery_id = delivery["data"]["deliveryId"].as_str().unwrap();

    // The seller is the initial custodian.
    let response = env
        .server
        .get("/api/v1/deliveries/my")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .await;
    assert_eq!(response.status_code(), 200);
    let mine: Value = response.json();
    assert_eq!(mine["count"], 1);
    assert_eq!(mine["data"][0]["deliveryId"], delivery_id);

    // The customer can read it; a stranger cannot.
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .await;
    assert_eq!(response.status_code(), 200);

    let (_stranger_id, stranger_token) = register_and_login(&env, "eve", "CUSTOMER").await;
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&stranger_token))
        .await;
    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_AUTHORIZED");
}

#[tokio::test(flavor = "multi_thread")]
async fn full_custody_flow_over_http() {
    let env = start_gateway(None).await;
    let (seller_id, seller_token) = register_and_login(&env, "sella", "SELLER").await;
    let (_customer_id, customer_token) = register_and_login(&env, "custo", "CUSTOMER").await;
    let (driver_id, driver_token) = register_and_login(&env, "dave-driver", "DELIVERY_PERSON").await;

    // Shortest path to a delivery: item → order → confirm.
    let item: Value = env
        .server
        .post("/api/v1/shop-items")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "name": "Lamp", "description": "Desk lamp", "priceCents": 4000, "quantityAvailable": 5,
        }))
        .await
        .json();
    let order: Value = env
        .server
        .post("/api/v1/orders")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .json(&json!({
            "sellerId": seller_id,
            "items": [{"itemId": item["data"]["itemId"], "quantity": 1}],
        }))
        .await
        .json();
    let delivery: Value = env
        .server
        .post(&format!("/api/v1/orders/{}/confirm", order["data"]["orderId"].as_str().unwrap()))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "packageWeight": 2.5, "packageLength": 30.0, "packageWidth": 20.0, "packageHeight": 15.0,
            "city": "New York", "state": "NY", "country": "US",
        }))
        .await
        .json();
    let delivery_id = delivery["data"]["deliveryId"].as_str().unwrap().to_string();

    // Watch the bus while custody moves.
    let mut bus: broadcast::Receiver<parceltrace_api::RoutedEvent> = env.state.events.subscribe();

    // Seller → driver.
    let response = env
        .server
        .post(&format!("/api/v1/deliveries/{}/handoff/initiate", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({ "toUserId": driver_id, "toRole": "DELIVERY_PERSON" }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let body: Value = response.json();
    assert_eq!(body["data"]["deliveryStatus"], "PENDING_PICKUP_HANDOFF");

    // Driver confirms; package fields fall back to current values.
    let response = env
        .server
        .post(&format!("/api/v1/deliveries/{}/handoff/confirm", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .json(&json!({ "city": "Brooklyn", "state": "NY", "country": "US" }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let body: Value = response.json();
    assert_eq!(body["data"]["deliveryStatus"], "IN_TRANSIT");
    assert_eq!(body["data"]["currentCustodianId"], driver_id);
    assert_eq!(body["data"]["packageWeight"], 2.5);

    // Driver reports location.
    let response = env
        .server
        .put(&format!("/api/v1/deliveries/{}/location", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .json(&json!({ "city": "Queens", "state": "NY", "country": "US" }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());

    // Driver → customer, customer confirms.
    let customer_user: Value = env
        .server
        .get(&format!("/api/v1/deliveries/{}", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .await
        .json();
    let customer_id = customer_user["data"]["customerId"].as_str().unwrap().to_string();

    env.server
        .post(&format!("/api/v1/deliveries/{}/handoff/initiate", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .json(&json!({ "toUserId": customer_id, "toRole": "CUSTOMER" }))
        .await
        .assert_status_ok();
    let response = env
        .server
        .post(&format!("/api/v1/deliveries/{}/handoff/confirm", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .json(&json!({ "city": "Queens", "state": "NY", "country": "US" }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let body: Value = response.json();
    assert_eq!(body["data"]["deliveryStatus"], "CONFIRMED_DELIVERY");

    // The seller (a party) can read history; the status path is recorded.
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}/history", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let history: Value = response.json();
    let statuses: Vec<&str> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["value"]["deliveryStatus"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec![
            "PENDING_PICKUP",
            "PENDING_PICKUP_HANDOFF",
            "IN_TRANSIT",
            "IN_TRANSIT",
            "PENDING_DELIVERY_CONFIRMATION",
            "CONFIRMED_DELIVERY",
        ]
    );

    // The consumer routed the custody events with party sets attached.
    let routed = tokio::time::timeout(Duration::from_secs(5), bus.recv())
        .await
        .expect("event within deadline")
        .expect("bus open");
    assert!(routed.parties.iter().any(|p| p == &seller_id));

    // A driver may fetch the customer address only while involved; after
    // delivery the customer holds custody, so the driver is out.
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}/address", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn driver_can_fetch_address_while_holding_custody() {
    let env = start_gateway(None).await;
    let (seller_id, seller_token) = register_and_login(&env, "s2", "SELLER").await;
    let (_c, customer_token) = register_and_login(&env, "c2", "CUSTOMER").await;
    let (driver_id, driver_token) = register_and_login(&env, "d2", "DELIVERY_PERSON").await;

    let item: Value = env
        .server
        .post("/api/v1/shop-items")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({"name": "Kettle", "description": "1.7L", "priceCents": 2500, "quantityAvailable": 3}))
        .await
        .json();
    let order: Value = env
        .server
        .post("/api/v1/orders")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .json(&json!({"sellerId": seller_id, "items": [{"itemId": item["data"]["itemId"], "quantity": 1}]}))
        .await
        .json();
    let delivery: Value = env
        .server
        .post(&format!("/api/v1/orders/{}/confirm", order["data"]["orderId"].as_str().unwrap()))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "packageWeight": 1.0, "packageLength": 20.0, "packageWidth": 20.0, "packageHeight": 20.0,
            "city": "Boston", "state": "MA", "country": "US",
        }))
        .await
        .json();
    let delivery_id = delivery["data"]["deliveryId"].as_str().unwrap();

    // Pending recipient: address visible.
    env.server
        .post(&format!("/api/v1/deliveries/{}/handoff/initiate", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({"toUserId": driver_id, "toRole": "DELIVERY_PERSON"}))
        .await
        .assert_status_ok();
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}/address", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let body: Value = response.json();
    assert_eq!(body["data"]["address"], "42 Test Lane, Springfield");

    // The customer role has no address route at all.
    let response = env
        .server
        .get(&format!("/api/v1/deliveries/{}/address", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn dispute_surfaces_conflict_free_and_terminal() {
    let env = start_gateway(None).await;
    let (seller_id, seller_token) = register_and_login(&env, "s3", "SELLER").await;
    let (_c, customer_token) = register_and_login(&env, "c3", "CUSTOMER").await;
    let (driver_id, driver_token) = register_and_login(&env, "d3", "DELIVERY_PERSON").await;

    let item: Value = env
        .server
        .post("/api/v1/shop-items")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({"name": "Vase", "description": "Fragile", "priceCents": 9000, "quantityAvailable": 1}))
        .await
        .json();
    let order: Value = env
        .server
        .post("/api/v1/orders")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&customer_token))
        .json(&json!({"sellerId": seller_id, "items": [{"itemId": item["data"]["itemId"], "quantity": 1}]}))
        .await
        .json();
    let delivery: Value = env
        .server
        .post(&format!("/api/v1/orders/{}/confirm", order["data"]["orderId"].as_str().unwrap()))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({
            "packageWeight": 3.0, "packageLength": 30.0, "packageWidth": 30.0, "packageHeight": 40.0,
            "city": "Boston", "state": "MA", "country": "US",
        }))
        .await
        .json();
    let delivery_id = delivery["data"]["deliveryId"].as_str().unwrap();

    env.server
        .post(&format!("/api/v1/deliveries/{}/handoff/initiate", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({"toUserId": driver_id, "toRole": "DELIVERY_PERSON"}))
        .await
        .assert_status_ok();

    let response = env
        .server
        .post(&format!("/api/v1/deliveries/{}/handoff/dispute", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&driver_token))
        .json(&json!({"reason": "damaged seal"}))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
    let body: Value = response.json();
    assert_eq!(body["data"]["deliveryStatus"], "DISPUTED_PICKUP");
    assert_eq!(body["data"]["currentCustodianId"], seller_id);

    // Terminal: further mutations map to 409 INVALID_STATE.
    let response = env
        .server
        .post(&format!("/api/v1/deliveries/{}/handoff/initiate", delivery_id))
        .add_header(axum::http::header::AUTHORIZATION, bearer(&seller_token))
        .json(&json!({"toUserId": driver_id, "toRole": "DELIVERY_PERSON"}))
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_STATE");
}

#[tokio::test]
async fn health_reports_consumer_liveness() {
    let env = start_gateway(None).await;
    // Give the consumer task a beat to subscribe.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let response = env.server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["eventConsumerAlive"], true);
}
