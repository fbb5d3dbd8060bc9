//! HTTP clients for the valuation and message-drafting services.

use std::time::Duration;

use async_trait::async_trait;
use leadline_core::{
  lead::{Property, Recommendation},
  upstream::{DraftRequest, Drafter, UpstreamError, ValuationResult, Valuator},
};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Build the shared HTTP client.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
pub fn client(timeout: Duration) -> reqwest::Result<Client> {
  Client::builder().timeout(timeout).build()
}

async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
  client: &Client,
  url: &str,
  body: &B,
) -> Result<T, UpstreamError> {
  let resp = client
    .post(url)
    .json(body)
    .send()
    .await
    .map_err(|e| UpstreamError::Transport(e.to_string()))?;

  if !resp.status().is_success() {
    return Err(UpstreamError::Status(resp.status().as_u16()));
  }
  resp
    .json()
    .await
    .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
}

// ─── Valuation ───────────────────────────────────────────────────────────────

/// What the evaluator is asked about.
#[derive(Debug, Serialize)]
struct ValuationQuery<'a> {
  city:          &'a str,
  listing_text:  Option<&'a str>,
  listing_price: Option<f64>,
  bedrooms:      Option<u32>,
}

impl<'a> ValuationQuery<'a> {
  fn of(p: &'a Property) -> Self {
    Self {
      city:          p.location.as_deref().unwrap_or_default(),
      listing_text:  p.description.as_deref(),
      listing_price: p.sale_price.or(p.price),
      bedrooms:      p.bedrooms,
    }
  }
}

/// The evaluator's answer. It names fields after its own report, so aliases
/// cover both spellings.
#[derive(Debug, Deserialize)]
struct ValuationReply {
  #[serde(alias = "property_valuation_score")]
  viability_score:        f64,
  recommendation:         String,
  #[serde(default)]
  degree_of_certainty:    Option<String>,
  #[serde(default, alias = "estimated_annual_gross_revenue")]
  estimated_annual_gross: Option<f64>,
}

impl TryFrom<ValuationReply> for ValuationResult {
  type Error = UpstreamError;

  fn try_from(reply: ValuationReply) -> Result<Self, Self::Error> {
    let recommendation = parse_recommendation(&reply.recommendation).ok_or_else(|| {
      UpstreamError::InvalidResponse(format!(
        "unknown recommendation {:?}",
        reply.recommendation
      ))
    })?;
    Ok(Self {
      viability_score: reply.viability_score,
      recommendation,
      degree_of_certainty: reply
        .degree_of_certainty
        .unwrap_or_else(|| "unknown".to_owned()),
      estimated_annual_gross: reply.estimated_annual_gross,
    })
  }
}

/// Lenient match: `"strong buy"`, `"Strong_Buy"` and `"STRONG BUY"` all work.
fn parse_recommendation(raw: &str) -> Option<Recommendation> {
  let norm: String = raw
    .chars()
    .filter(|c| c.is_alphanumeric())
    .collect::<String>()
    .to_lowercase();
  match norm.as_str() {
    "strongbuy" => Some(Recommendation::StrongBuy),
    "good" | "buy" => Some(Recommendation::Good),
    "marginal" | "hold" => Some(Recommendation::Marginal),
    "avoid" | "pass" => Some(Recommendation::Avoid),
    _ => None,
  }
}

pub struct HttpValuator {
  client: Client,
  url:    String,
}

impl HttpValuator {
  pub fn new(client: Client, url: impl Into<String>) -> Self {
    Self { client, url: url.into() }
  }
}

#[async_trait]
impl Valuator for HttpValuator {
  async fn valuate(&self, property: &Property) -> Result<ValuationResult, UpstreamError> {
    let reply: ValuationReply =
      post_json(&self.client, &self.url, &ValuationQuery::of(property)).await?;
    reply.try_into()
  }
}

// ─── Drafting ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DraftReply {
  message: String,
}

pub struct HttpDrafter {
  client: Client,
  url:    String,
}

impl HttpDrafter {
  pub fn new(client: Client, url: impl Into<String>) -> Self {
    Self { client, url: url.into() }
  }
}

#[async_trait]
impl Drafter for HttpDrafter {
  async fn draft(&self, request: &DraftRequest) -> Result<String, UpstreamError> {
    let reply: DraftReply = post_json(&self.client, &self.url, request).await?;
    let text = reply.message.trim();
    if text.is_empty() {
      return Err(UpstreamError::InvalidResponse("empty draft".into()));
    }
    Ok(text.to_owned())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn evaluator_report_maps_onto_result() {
    let reply: ValuationReply = serde_json::from_value(json!({
      "property_valuation_score": 8.2,
      "recommendation": "Strong Buy",
      "estimated_annual_gross_revenue": 31000.0,
      "cap_rate": "6.1%",
    }))
    .unwrap();
    let result = ValuationResult::try_from(reply).unwrap();
    assert_eq!(result.viability_score, 8.2);
    assert_eq!(result.recommendation, Recommendation::StrongBuy);
    assert_eq!(result.degree_of_certainty, "unknown");
    assert_eq!(result.estimated_annual_gross, Some(31000.0));
  }

  #[test]
  fn unknown_recommendation_is_invalid_response() {
    let reply: ValuationReply = serde_json::from_value(json!({
      "viability_score": 5.0,
      "recommendation": "maybe later",
    }))
    .unwrap();
    assert!(matches!(
      ValuationResult::try_from(reply),
      Err(UpstreamError::InvalidResponse(_))
    ));
  }

  #[test]
  fn recommendation_parsing_is_lenient() {
    assert_eq!(parse_recommendation("strong_buy"), Some(Recommendation::StrongBuy));
    assert_eq!(parse_recommendation(" AVOID "), Some(Recommendation::Avoid));
    assert_eq!(parse_recommendation(""), None);
  }
}
