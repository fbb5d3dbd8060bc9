//! JSON REST API for Leadline.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`LeadStore`] and [`ConsumerStore`], plus the valuation and drafting
//! collaborators. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", leadline_api::api_router(ApiState::new(store.clone())))
//! ```

pub mod b2c;
pub mod bulk;
pub mod error;
pub mod owners;
pub mod pipeline;
pub mod properties;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use leadline_core::{
  alert::AlertGate,
  store::{ConsumerStore, LeadStore},
  upstream::{Drafter, Unconfigured, Valuator},
};

pub use error::ApiError;

/// Bound shared by every handler.
pub trait Backend: LeadStore + ConsumerStore + 'static {}

impl<S: LeadStore + ConsumerStore + 'static> Backend for S {}

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub valuator: Arc<dyn Valuator>,
  pub drafter:  Arc<dyn Drafter>,
  pub gate:     AlertGate<S>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      valuator: self.valuator.clone(),
      drafter:  self.drafter.clone(),
      gate:     self.gate.clone(),
    }
  }
}

impl<S: Backend> ApiState<S> {
  /// State with both collaborators unconfigured.
  pub fn new(store: Arc<S>) -> Self {
    Self {
      gate: AlertGate::new(store.clone()),
      store,
      valuator: Arc::new(Unconfigured),
      drafter: Arc::new(Unconfigured),
    }
  }

  pub fn with_valuator(mut self, valuator: Arc<dyn Valuator>) -> Self {
    self.valuator = valuator;
    self
  }

  pub fn with_drafter(mut self, drafter: Arc<dyn Drafter>) -> Self {
    self.drafter = drafter;
    self
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: Backend>(state: ApiState<S>) -> Router<()> {
  Router::new()
    // Owners
    .route("/owners", get(owners::list::<S>).post(owners::create::<S>))
    .route("/owners/{id}", get(owners::get_one::<S>).patch(owners::update::<S>))
    .route("/owners/{id}/properties", post(owners::add_property::<S>))
    .route(
      "/owners/{id}/timeline",
      get(owners::timeline::<S>).post(owners::append_timeline::<S>),
    )
    // Properties
    .route(
      "/properties/{id}",
      get(properties::get_one::<S>).patch(properties::update::<S>),
    )
    .route("/properties/{id}/transfer", post(properties::transfer::<S>))
    .route("/properties/{id}/valuation", post(properties::valuate::<S>))
    .route(
      "/properties/{id}/conversations",
      get(properties::conversations::<S>).post(properties::append_conversation::<S>),
    )
    .route(
      "/properties/{id}/timeline",
      get(properties::timeline::<S>).post(properties::append_timeline::<S>),
    )
    .route("/draft", post(properties::draft::<S>))
    // Pipeline
    .route("/pipeline/summary", get(pipeline::summary::<S>))
    .route("/pipeline/{kind}/board", get(pipeline::board::<S>))
    .route("/pipeline/{kind}/table", get(pipeline::table::<S>))
    // Bulk
    .route("/bulk", post(bulk::handler::<S>))
    // B2C
    .route(
      "/b2c/users/{user_id}/preferences",
      get(b2c::get_preferences::<S>).put(b2c::upsert_preferences::<S>),
    )
    .route("/b2c/users/{user_id}/alerts", get(b2c::list_alerts::<S>))
    .route("/b2c/users/{user_id}/alerts/evaluate", post(b2c::evaluate::<S>))
    .route(
      "/b2c/users/{user_id}/alerts/{listing_id}/ignore",
      post(b2c::ignore::<S>),
    )
    .route("/b2c/alerts/pending", post(b2c::pending::<S>))
    .route(
      "/b2c/users/{user_id}/saved",
      get(b2c::list_saved::<S>).post(b2c::save::<S>),
    )
    .route(
      "/b2c/users/{user_id}/saved/{listing_id}",
      get(b2c::get_saved::<S>)
        .patch(b2c::update_saved::<S>)
        .delete(b2c::remove_saved::<S>),
    )
    .route(
      "/b2c/users/{user_id}/saved/{listing_id}/messages",
      post(b2c::append_saved_message::<S>),
    )
    .route(
      "/b2c/users/{user_id}/saved/{listing_id}/timeline",
      post(b2c::add_saved_timeline::<S>),
    )
    .with_state(state)
}

#[cfg(test)]
mod tests;
