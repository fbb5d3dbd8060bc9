//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use leadline_core::{
  lead::{Property, Recommendation},
  upstream::{UpstreamError, ValuationResult, Valuator},
};
use leadline_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{ApiState, api_router};

async fn state() -> ApiState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  ApiState::new(Arc::new(store))
}

async fn call(
  app: &Router,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(b) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string())),
    None => builder.body(Body::empty()),
  }
  .unwrap();

  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn create_owner(app: &Router, email: &str, url: &str) -> Value {
  let (status, owner) = call(
    app,
    "POST",
    "/owners",
    Some(json!({
      "name": "Maria Garcia",
      "email": email,
      "location": "Lisbon, Portugal",
      "price": 320000.0,
      "listing_url": url,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  owner
}

// ── Owners & properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn create_owner_returns_201_with_default_stages() {
  let app = api_router(state().await);
  let owner = create_owner(&app, "maria@x.com", "https://x/1").await;

  let property = &owner["properties"][0];
  assert_eq!(property["sales_pipeline_stage"], "New Lead");
  assert_eq!(property["chatbot_pipeline_stage"], "No Contact");

  let id = owner["id"].as_i64().unwrap();
  let (status, fetched) = call(&app, "GET", &format!("/owners/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fetched, owner);
}

#[tokio::test]
async fn missing_email_is_400_validation_failed() {
  let app = api_router(state().await);
  let (status, body) =
    call(&app, "POST", "/owners", Some(json!({ "name": "No Email" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation_failed");

  let (_, owners) = call(&app, "GET", "/owners", None).await;
  assert_eq!(owners, json!([]));
}

#[tokio::test]
async fn unknown_owner_is_404() {
  let app = api_router(state().await);
  let (status, body) = call(&app, "GET", "/owners/41", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn bogus_stage_is_rejected_and_property_unchanged() {
  let app = api_router(state().await);
  let owner = create_owner(&app, "a@x.com", "https://x/1").await;
  let pid = owner["properties"][0]["id"].as_i64().unwrap();
  let uri = format!("/properties/{pid}");

  let (status, body) = call(
    &app,
    "PATCH",
    &uri,
    Some(json!({ "sales_pipeline_stage": "Bogus", "price": 1.0 })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_stage");

  let (_, property) = call(&app, "GET", &uri, None).await;
  assert_eq!(property["sales_pipeline_stage"], "New Lead");
  assert_eq!(property["price"], 320000.0);
}

#[tokio::test]
async fn stage_patch_shows_up_on_timeline() {
  let app = api_router(state().await);
  let owner = create_owner(&app, "a@x.com", "https://x/1").await;
  let pid = owner["properties"][0]["id"].as_i64().unwrap();

  let (status, property) = call(
    &app,
    "PATCH",
    &format!("/properties/{pid}"),
    Some(json!({ "sales_pipeline_stage": "Contacted" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert!(property["last_contact_at"].is_string());

  let (_, timeline) = call(&app, "GET", &format!("/properties/{pid}/timeline"), None).await;
  assert_eq!(timeline.as_array().unwrap().len(), 1);
  assert_eq!(timeline[0]["kind"], "status");
}

#[tokio::test]
async fn conversation_append_and_filter() {
  let app = api_router(state().await);
  let owner = create_owner(&app, "a@x.com", "https://x/1").await;
  let pid = owner["properties"][0]["id"].as_i64().unwrap();
  let uri = format!("/properties/{pid}/conversations");

  for (channel, text) in [("Email", "Hello by mail"), ("WhatsApp", "Hello on chat")] {
    let (status, created) = call(
      &app,
      "POST",
      &uri,
      Some(json!({ "channel": channel, "sender": "ai", "message": text })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["id"].is_string());
  }

  let (_, all) = call(&app, "GET", &uri, None).await;
  assert_eq!(all.as_array().unwrap().len(), 2);
  let (_, chat) = call(&app, "GET", &format!("{uri}?channel=WhatsApp"), None).await;
  assert_eq!(chat.as_array().unwrap().len(), 1);
  assert_eq!(chat[0]["message"], "Hello on chat");
}

#[tokio::test]
async fn transfer_moves_property_between_owners() {
  let app = api_router(state().await);
  let a = create_owner(&app, "a@x.com", "https://x/1").await;
  let b = create_owner(&app, "b@x.com", "https://x/2").await;
  let pid = a["properties"][0]["id"].as_i64().unwrap();

  let (status, property) = call(
    &app,
    "POST",
    &format!("/properties/{pid}/transfer"),
    Some(json!({ "owner_id": b["id"] })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(property["owner_id"], b["id"]);

  let (_, a) = call(&app, "GET", &format!("/owners/{}", a["id"]), None).await;
  assert_eq!(a["properties"], json!([]));
}

// ── Collaborators ────────────────────────────────────────────────────────────

struct Fixed;

#[async_trait]
impl Valuator for Fixed {
  async fn valuate(&self, _: &Property) -> Result<ValuationResult, UpstreamError> {
    Ok(ValuationResult {
      viability_score:        7.5,
      recommendation:         Recommendation::Good,
      degree_of_certainty:    "medium".into(),
      estimated_annual_gross: None,
    })
  }
}

#[tokio::test]
async fn valuation_without_service_is_stale_not_an_error() {
  let app = api_router(state().await);
  let owner = create_owner(&app, "a@x.com", "https://x/1").await;
  let pid = owner["properties"][0]["id"].as_i64().unwrap();

  let (status, body) =
    call(&app, "POST", &format!("/properties/{pid}/valuation"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["stale"], true);
  assert!(body["property"]["viability_score"].is_null());
}

#[tokio::test]
async fn valuation_is_cached_on_the_property() {
  let app = api_router(state().await.with_valuator(Arc::new(Fixed)));
  let owner = create_owner(&app, "a@x.com", "https://x/1").await;
  let pid = owner["properties"][0]["id"].as_i64().unwrap();

  let (_, body) = call(&app, "POST", &format!("/properties/{pid}/valuation"), None).await;
  assert_eq!(body["stale"], false);
  assert_eq!(body["property"]["recommendation"], "Good");

  let (_, property) = call(&app, "GET", &format!("/properties/{pid}"), None).await;
  assert_eq!(property["viability_score"], 7.5);
}

#[tokio::test]
async fn draft_without_service_is_503() {
  let app = api_router(state().await);
  let (status, body) = call(
    &app,
    "POST",
    "/draft",
    Some(json!({ "property_id": "7", "contact_goal": "book_call" })),
  )
  .await;
  assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
  assert_eq!(body["kind"], "upstream_unavailable");
}

// ── Pipeline & bulk ──────────────────────────────────────────────────────────

#[tokio::test]
async fn board_table_and_summary_agree() {
  let app = api_router(state().await);
  create_owner(&app, "a@x.com", "https://x/1").await;
  create_owner(&app, "b@x.com", "https://x/2").await;

  let (status, board) = call(&app, "GET", "/pipeline/sales/board", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(board["columns"].as_array().unwrap().len(), 8);
  assert_eq!(board["columns"][0]["stage"], json!({ "pipeline": "sales", "stage": "New Lead" }));
  assert_eq!(board["columns"][0]["owner_ids"].as_array().unwrap().len(), 2);

  let (_, table) = call(&app, "GET", "/pipeline/chatbot/table?text=b%40x", None).await;
  assert_eq!(table.as_array().unwrap().len(), 1);
  assert_eq!(
    table[0]["primary_stage"],
    json!({ "pipeline": "chatbot", "stage": "No Contact" })
  );

  let (_, summary) = call(&app, "GET", "/pipeline/summary", None).await;
  assert_eq!(summary["total_owners"], 2);
  assert_eq!(summary["new_leads"], 2);
}

#[tokio::test]
async fn bulk_reports_per_owner_outcomes() {
  let app = api_router(state().await);
  let a = create_owner(&app, "a@x.com", "https://x/1").await;

  let (status, report) = call(
    &app,
    "POST",
    "/bulk",
    Some(json!({ "owner_ids": [a["id"], 999], "mark_contacted": true })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["succeeded"], json!([a["id"]]));
  assert_eq!(report["failed"]["999"]["kind"], "not_found");

  let (status, body) = call(
    &app,
    "POST",
    "/bulk",
    Some(json!({ "owner_ids": [a["id"]], "set_stage": { "pipeline": "sales", "stage": "Lost" } })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_stage");

  let (status, body) =
    call(&app, "POST", "/bulk", Some(json!({ "owner_ids": [a["id"]] }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "validation_failed");
}

// ── B2C ──────────────────────────────────────────────────────────────────────

fn listing(id: &str) -> Value {
  json!({
    "id": id,
    "title": "Bright two-bedroom near the park",
    "description": "Quiet street, renovated kitchen.",
    "commune": "Bonnevoie",
    "rent_or_buy": "rent",
    "price": 1500.0,
    "bedrooms": 2,
  })
}

#[tokio::test]
async fn unsupported_threshold_is_400() {
  let app = api_router(state().await);
  let (status, body) = call(
    &app,
    "PUT",
    "/b2c/users/u1/preferences",
    Some(json!({ "controls": { "alert_match_threshold": 85 } })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "malformed");

  let (status, prefs) = call(&app, "GET", "/b2c/users/u1/preferences", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(prefs["controls"]["alert_match_threshold"], 80);
}

#[tokio::test]
async fn evaluate_then_pending_delivers_once() {
  let app = api_router(state().await);
  let (status, _) = call(
    &app,
    "PUT",
    "/b2c/users/u1/preferences",
    Some(json!({ "controls": { "alert_match_threshold": 90 } })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let evaluate = "/b2c/users/u1/alerts/evaluate";
  let (_, low) = call(
    &app,
    "POST",
    evaluate,
    Some(json!({ "listing": listing("L1"), "external_rank": 0.625 })),
  )
  .await;
  assert_eq!(low["match_pct"], 85);
  assert_eq!(low["record"]["status"]["state"], "suppressed");

  let (_, high) = call(
    &app,
    "POST",
    evaluate,
    Some(json!({ "listing": listing("L1"), "external_rank": 0.8 })),
  )
  .await;
  assert_eq!(high["match_pct"], 92);
  assert_eq!(high["record"]["status"]["state"], "queued");

  let (status, deliveries) = call(&app, "POST", "/b2c/alerts/pending", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(deliveries.as_array().unwrap().len(), 1);
  assert_eq!(deliveries[0]["channel"], "in_app");

  let (_, again) = call(&app, "POST", "/b2c/alerts/pending?flush_digest=true", None).await;
  assert_eq!(again, json!([]));
}

#[tokio::test]
async fn ignore_is_sticky_over_http() {
  let app = api_router(state().await);
  let (_, ignored) = call(&app, "POST", "/b2c/users/u1/alerts/L1/ignore", None).await;
  assert_eq!(ignored["status"]["reason"], "manual");

  let (_, eval) = call(
    &app,
    "POST",
    "/b2c/users/u1/alerts/evaluate",
    Some(json!({ "listing": listing("L1"), "external_rank": 1.0 })),
  )
  .await;
  assert_eq!(eval["record"]["status"]["reason"], "manual");
}

#[tokio::test]
async fn saved_apartment_lifecycle() {
  let app = api_router(state().await);
  let base = "/b2c/users/u1/saved";

  let (status, saved) = call(
    &app,
    "POST",
    base,
    Some(json!({ "listing": listing("L1"), "match_pct": 88 })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(saved["saved_status"], "Interested");
  assert_eq!(saved["match_pct"], 88);

  let item = format!("{base}/L1");
  let (_, patched) = call(
    &app,
    "PATCH",
    &item,
    Some(json!({ "saved_status": "Viewing Scheduled" })),
  )
  .await;
  assert_eq!(patched["timeline"].as_array().unwrap().len(), 2);

  let (status, _) = call(
    &app,
    "POST",
    &format!("{item}/messages"),
    Some(json!({ "role": "user", "text": "Is it still available?" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (_, list) = call(&app, "GET", base, None).await;
  assert_eq!(list.as_array().unwrap().len(), 1);

  let (status, _) = call(&app, "DELETE", &item, None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, body) = call(&app, "DELETE", &item, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}
