//! API routes

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{webhook_signature_middleware, AppState};
use crate::handlers::{campaigns, contacts, health, links, metrics, opt_in, webhooks};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    // Provider callbacks, signed when a secret is configured
    let webhook_routes = Router::new()
        .route("/sms/status", post(webhooks::status_callback))
        .route("/sms/inbound", post(webhooks::inbound_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_signature_middleware,
        ));

    let api = Router::new()
        .route("/campaigns/:campaign_id/send", post(campaigns::send_campaign))
        .route("/campaigns/:campaign_id/test", post(campaigns::test_campaign))
        .route("/opt-in", post(opt_in::request_opt_in))
        .route("/opt-in/:token", get(opt_in::confirm_opt_in))
        .route("/unsubscribe", post(contacts::unsubscribe))
        .nest("/webhooks", webhook_routes);

    Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(metrics::metrics))
        .route("/s/:code", get(links::follow_link))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use hmac::{Hmac, Mac};
    use pretty_assertions::assert_eq;
    use sha2::Sha256;
    use smscast_common::config::{OptInConfig, ShortLinkConfig, SmsConfig};
    use smscast_core::{
        CampaignEngine, ClickTracker, DeliveryReconciler, EngineMetrics, OptInManager,
        ShortLinkClient, TwilioGateway,
    };
    use smscast_storage::memory::MemoryStore;
    use smscast_storage::models::{CreateCampaign, CreateContact, CreateMessage, CreateShortLink};
    use smscast_storage::repository::{
        CampaignRepository, ContactRepository, MessageRepository, ShortLinkRepository, Stores,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app_with_secret(store: &Arc<MemoryStore>, secret: Option<&str>) -> Router {
        let stores = Stores::in_memory(store.clone());
        // No credentials: every SMS fails closed and no request leaves the process
        let sms = Arc::new(TwilioGateway::new(&SmsConfig::default()).unwrap());
        let shortener = Arc::new(ShortLinkClient::new(ShortLinkConfig::default()).unwrap());
        let metrics = Arc::new(EngineMetrics::new().unwrap());

        let state = AppState {
            engine: Arc::new(CampaignEngine::new(
                stores.clone(),
                sms.clone(),
                shortener,
                metrics.clone(),
            )),
            reconciler: Arc::new(DeliveryReconciler::new(
                stores.clone(),
                sms.clone(),
                metrics.clone(),
            )),
            opt_in: Arc::new(OptInManager::new(
                stores.clone(),
                sms,
                "http://localhost:8080",
                &OptInConfig::default(),
            )),
            clicks: Arc::new(ClickTracker::new(stores.clone(), metrics.clone())),
            stores,
            db_pool: None,
            metrics,
            webhook_secret: secret.map(str::to_string),
        };
        create_router(Arc::new(state))
    }

    fn app(store: &Arc<MemoryStore>) -> Router {
        app_with_secret(store, None)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_post(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn draft(store: &MemoryStore) -> Uuid {
        CampaignRepository::create(
            store,
            CreateCampaign {
                owner_id: Uuid::new_v4(),
                name: "Launch".into(),
                content: "Hi {{first_name}}".into(),
                ..CreateCampaign::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_health() {
        let store = Arc::new(MemoryStore::new());

        let response = app(&store).oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");

        let response = app(&store).oneshot(get_req("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposed() {
        let store = Arc::new(MemoryStore::new());
        let response = app(&store).oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("smscast_sms_sent_total"));
    }

    #[tokio::test]
    async fn test_send_campaign_claims_once() {
        let store = Arc::new(MemoryStore::new());
        let id = draft(&store).await;
        let app = app(&store);

        let uri = format!("/api/campaigns/{}/send", id);
        let response = app
            .clone()
            .oneshot(json_post(&uri, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "sending");

        let response = app
            .clone()
            .oneshot(json_post(&uri, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "NOT_EXECUTABLE");

        let uri = format!("/api/campaigns/{}/send", Uuid::new_v4());
        let response = app
            .oneshot(json_post(&uri, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_test_send_errors() {
        let store = Arc::new(MemoryStore::new());
        let id = draft(&store).await;
        let uri = format!("/api/campaigns/{}/test", id);

        let response = app(&store)
            .oneshot(json_post(&uri, serde_json::json!({ "phone_number": "123" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // Gateway has no credentials
        let response = app(&store)
            .oneshot(json_post(
                &uri,
                serde_json::json!({ "phone_number": "5550000001" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        ContactRepository::create(
            store.as_ref(),
            CreateContact {
                owner_id: owner,
                phone_number: "+15550000001".into(),
                is_opted_in: true,
                ..CreateContact::default()
            },
        )
        .await
        .unwrap();

        let response = app(&store)
            .oneshot(json_post(
                "/api/unsubscribe",
                serde_json::json!({ "phone_number": "(555) 000-0001" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["contacts"], 1);

        let contact = store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(contact.is_unsubscribed);

        // Already unsubscribed is still a known number
        let response = app(&store)
            .oneshot(json_post(
                "/api/unsubscribe",
                serde_json::json!({ "phone_number": "+15550000001" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["contacts"], 1);

        let response = app(&store)
            .oneshot(json_post(
                "/api/unsubscribe",
                serde_json::json!({ "phone_number": "+15559999999" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_opt_in_endpoints() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        ContactRepository::create(
            store.as_ref(),
            CreateContact {
                owner_id: owner,
                phone_number: "+15550000001".into(),
                ..CreateContact::default()
            },
        )
        .await
        .unwrap();

        let response = app(&store)
            .oneshot(json_post(
                "/api/opt-in",
                serde_json::json!({ "owner_id": owner, "phone_number": "+15550000001" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["is_confirmed"], false);

        let response = app(&store)
            .oneshot(get_req("/api/opt-in/unknown-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_short_link_redirect() {
        let store = Arc::new(MemoryStore::new());
        let link = ShortLinkRepository::create(
            store.as_ref(),
            CreateShortLink {
                owner_id: Uuid::new_v4(),
                campaign_id: None,
                original_url: "https://shop.example.com/sale".into(),
                short_code: "Ab12Cd".into(),
                short_url: "https://sms.ly/Ab12Cd".into(),
                title: None,
            },
        )
        .await
        .unwrap();

        let request = Request::builder()
            .uri("/s/Ab12Cd")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(header::USER_AGENT, "Mozilla/5.0")
            .body(Body::empty())
            .unwrap();
        let response = app(&store).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://shop.example.com/sale"
        );

        let clicks = store.link_clicks(link.id).await;
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(clicks[0].user_agent.as_deref(), Some("Mozilla/5.0"));

        let response = app(&store).oneshot(get_req("/s/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_webhook_requires_valid_signature() {
        let store = Arc::new(MemoryStore::new());
        MessageRepository::create(
            store.as_ref(),
            CreateMessage {
                campaign_id: None,
                contact_id: None,
                phone_number: "+15550000001".into(),
                content: "hi".into(),
                status: "sent".into(),
                provider_message_id: Some("SM1".into()),
                error_message: None,
                sent_at: None,
            },
        )
        .await
        .unwrap();
        let app = app_with_secret(&store, Some("whsec"));
        let body = "MessageSid=SM1&MessageStatus=delivered";

        let response = app
            .clone()
            .oneshot(form_post("/api/webhooks/sms/status", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec").unwrap();
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut request = form_post("/api/webhooks/sms/status", body);
        request
            .headers_mut()
            .insert("x-smscast-signature", signature.parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let message = store.find_by_provider_id("SM1").await.unwrap().unwrap();
        assert_eq!(message.status, "delivered");
        assert!(message.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_inbound_stop_webhook() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        ContactRepository::create(
            store.as_ref(),
            CreateContact {
                owner_id: owner,
                phone_number: "+15550000001".into(),
                is_opted_in: true,
                ..CreateContact::default()
            },
        )
        .await
        .unwrap();

        let response = app(&store)
            .oneshot(form_post(
                "/api/webhooks/sms/inbound",
                "From=%2B15550000001&Body=Stop",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");

        let contact = store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(contact.is_unsubscribed);
    }
}
