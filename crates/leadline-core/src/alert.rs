//! The alert gate: decides whether a scored listing should alert its user.
//!
//! State is kept per `(user_id, listing_id)` pair. Scoring never changes a
//! pair that was delivered or manually ignored; anything else is re-decided
//! from the user's current controls each time it is scored. Ignoring always
//! wins, even over a delivered pair.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  b2c::{AlertChannel, AlertFrequency, Controls, Listing, UserPreferences},
  error::ValidationError,
  matching,
  store::ConsumerStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
  BelowThreshold,
  WarningsOff,
  NoChannels,
  /// The user ignored the listing; sticky.
  Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertStatus {
  Suppressed { reason: SuppressReason },
  Queued { pending_digest: bool },
  Delivered {
    at:       DateTime<Utc>,
    channels: Vec<AlertChannel>,
  },
}

impl AlertStatus {
  /// Terminal states never change again.
  pub fn is_final(&self) -> bool {
    matches!(
      self,
      Self::Delivered { .. } | Self::Suppressed { reason: SuppressReason::Manual }
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
  pub user_id:    String,
  pub listing_id: String,
  pub match_pct:  Option<u8>,
  pub status:     AlertStatus,
  pub updated_at: DateTime<Utc>,
}

impl AlertRecord {
  /// The record as delivered on `channels`.
  pub fn delivered(&self, channels: Vec<AlertChannel>, at: DateTime<Utc>) -> Self {
    Self {
      status: AlertStatus::Delivered { at, channels },
      updated_at: at,
      ..self.clone()
    }
  }
}

/// Decide the next state of a pair after it was scored `match_pct`.
pub fn decide(
  prior: Option<AlertRecord>,
  controls: &Controls,
  user_id: &str,
  listing_id: &str,
  match_pct: u8,
  now: DateTime<Utc>,
) -> Result<AlertRecord> {
  if match_pct > 100 {
    return Err(ValidationError::ScoreOutOfRange.into());
  }
  if let Some(prior) = prior
    && prior.status.is_final()
  {
    return Ok(prior);
  }

  let status = if !controls.early_warnings {
    AlertStatus::Suppressed { reason: SuppressReason::WarningsOff }
  } else if controls.alert_channels.is_empty() {
    AlertStatus::Suppressed { reason: SuppressReason::NoChannels }
  } else if match_pct < controls.alert_match_threshold.percent() {
    AlertStatus::Suppressed { reason: SuppressReason::BelowThreshold }
  } else {
    AlertStatus::Queued {
      pending_digest: controls.alert_frequency == AlertFrequency::DailyDigest,
    }
  };

  Ok(AlertRecord {
    user_id: user_id.to_owned(),
    listing_id: listing_id.to_owned(),
    match_pct: Some(match_pct),
    status,
    updated_at: now,
  })
}

/// Manually suppress a pair, whatever state it was in.
pub fn ignore(
  prior: Option<AlertRecord>,
  user_id: &str,
  listing_id: &str,
  now: DateTime<Utc>,
) -> AlertRecord {
  AlertRecord {
    user_id: user_id.to_owned(),
    listing_id: listing_id.to_owned(),
    match_pct: prior.and_then(|p| p.match_pct),
    status: AlertStatus::Suppressed { reason: SuppressReason::Manual },
    updated_at: now,
  }
}

/// One alert sent on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
  pub user_id:    String,
  pub listing_id: String,
  pub match_pct:  Option<u8>,
  pub channel:    AlertChannel,
}

/// Outcome of scoring one listing for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
  /// `None` when a hard filter excluded the listing; no state was touched.
  pub match_pct: Option<u8>,
  pub record:    Option<AlertRecord>,
}

/// Scores listings against stored preferences and drives alert delivery.
pub struct AlertGate<S> {
  store: Arc<S>,
}

impl<S> Clone for AlertGate<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: ConsumerStore> AlertGate<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  async fn preferences(&self, user_id: &str) -> Result<UserPreferences, S::Error> {
    Ok(
      self
        .store
        .get_preferences(user_id.to_owned())
        .await?
        .unwrap_or_else(|| UserPreferences::new(user_id, Utc::now())),
    )
  }

  /// Match score of `listing` for the user, `None` if filtered out.
  pub async fn score(
    &self,
    user_id: &str,
    listing: &Listing,
    external_rank: Option<f64>,
  ) -> Result<Option<u8>, S::Error> {
    let prefs = self.preferences(user_id).await?;
    Ok(matching::match_pct(
      &prefs.filters,
      &prefs.voice_context,
      listing,
      external_rank,
    ))
  }

  /// Score a listing and record the gate decision for it.
  pub async fn evaluate(
    &self,
    user_id: &str,
    listing: &Listing,
    external_rank: Option<f64>,
  ) -> Result<Evaluation, S::Error> {
    let Some(pct) = self.score(user_id, listing, external_rank).await? else {
      tracing::debug!(user_id, listing_id = %listing.id, "listing excluded by hard filters");
      return Ok(Evaluation { match_pct: None, record: None });
    };
    let record = self
      .store
      .record_alert_score(user_id.to_owned(), listing.id.clone(), pct)
      .await?;
    Ok(Evaluation { match_pct: Some(pct), record: Some(record) })
  }

  pub async fn ignore(
    &self,
    user_id: &str,
    listing_id: &str,
  ) -> Result<AlertRecord, S::Error> {
    self
      .store
      .ignore_alert(user_id.to_owned(), listing_id.to_owned())
      .await
  }

  /// Deliver queued alerts. Digest items wait for `flush_digest`.
  ///
  /// Each pair is re-decided under the user's current controls first, so a
  /// threshold raised after queueing suppresses it and a switch to the daily
  /// digest holds it back until the next flush. Delivery is a
  /// compare-and-set from queued, so concurrent runs never double-send.
  pub async fn evaluate_pending(
    &self,
    flush_digest: bool,
  ) -> Result<Vec<Delivery>, S::Error> {
    let mut deliveries = Vec::new();
    for queued in self.store.queued_alerts().await? {
      let Some(pct) = queued.match_pct else { continue };

      let current = self
        .store
        .record_alert_score(queued.user_id.clone(), queued.listing_id.clone(), pct)
        .await?;
      match current.status {
        AlertStatus::Queued { pending_digest: true } if !flush_digest => continue,
        AlertStatus::Queued { .. } => {}
        _ => {
          tracing::debug!(
            user_id = %current.user_id,
            listing_id = %current.listing_id,
            "queued alert no longer passes the gate"
          );
          continue;
        }
      }

      let prefs = self.preferences(&current.user_id).await?;
      let channels: Vec<AlertChannel> =
        prefs.controls.alert_channels.iter().copied().collect();
      let delivered = self
        .store
        .mark_delivered(
          current.user_id.clone(),
          current.listing_id.clone(),
          channels.clone(),
          Utc::now(),
        )
        .await?;
      if !delivered {
        continue;
      }

      tracing::info!(
        user_id = %current.user_id,
        listing_id = %current.listing_id,
        match_pct = pct,
        "alert delivered"
      );
      deliveries.extend(channels.into_iter().map(|channel| Delivery {
        user_id: current.user_id.clone(),
        listing_id: current.listing_id.clone(),
        match_pct: current.match_pct,
        channel,
      }));
    }
    Ok(deliveries)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use super::*;
  use crate::b2c::MatchThreshold;

  fn controls(threshold: MatchThreshold) -> Controls {
    Controls { alert_match_threshold: threshold, ..Controls::default() }
  }

  #[test]
  fn threshold_gates_and_delivered_is_sticky() {
    let now = Utc::now();
    let strong = controls(MatchThreshold::Strong);

    let first = decide(None, &strong, "u1", "L1", 85, now).unwrap();
    assert_eq!(first.status, AlertStatus::Suppressed {
      reason: SuppressReason::BelowThreshold,
    });

    let second = decide(Some(first), &strong, "u1", "L1", 92, now).unwrap();
    assert_eq!(second.status, AlertStatus::Queued { pending_digest: false });

    let delivered = second.delivered(vec![AlertChannel::InApp], now);
    let third = decide(Some(delivered.clone()), &strong, "u1", "L1", 99, now).unwrap();
    assert_eq!(third, delivered);
  }

  #[test]
  fn warnings_off_and_empty_channels_suppress() {
    let now = Utc::now();
    let off = Controls { early_warnings: false, ..Controls::default() };
    assert_eq!(
      decide(None, &off, "u", "l", 100, now).unwrap().status,
      AlertStatus::Suppressed { reason: SuppressReason::WarningsOff }
    );

    let mute = Controls { alert_channels: BTreeSet::new(), ..Controls::default() };
    assert_eq!(
      decide(None, &mute, "u", "l", 100, now).unwrap().status,
      AlertStatus::Suppressed { reason: SuppressReason::NoChannels }
    );
  }

  #[test]
  fn digest_frequency_marks_pending() {
    let c = Controls {
      alert_frequency: AlertFrequency::DailyDigest,
      ..Controls::default()
    };
    let r = decide(None, &c, "u", "l", 80, Utc::now()).unwrap();
    assert_eq!(r.status, AlertStatus::Queued { pending_digest: true });
  }

  #[test]
  fn ignore_is_sticky_and_overrides_delivered() {
    let now = Utc::now();
    let queued = decide(None, &Controls::default(), "u", "l", 95, now).unwrap();
    let ignored = ignore(Some(queued), "u", "l", now);
    assert_eq!(ignored.match_pct, Some(95));
    let again = decide(Some(ignored.clone()), &Controls::default(), "u", "l", 100, now)
      .unwrap();
    assert_eq!(again, ignored);

    let delivered = decide(None, &Controls::default(), "u", "l", 95, now)
      .unwrap()
      .delivered(vec![AlertChannel::Email], now);
    let dismissed = ignore(Some(delivered), "u", "l", now);
    assert_eq!(dismissed.status, AlertStatus::Suppressed {
      reason: SuppressReason::Manual,
    });
    assert_eq!(dismissed.match_pct, Some(95));
  }

  #[test]
  fn score_above_100_is_rejected() {
    assert!(decide(None, &Controls::default(), "u", "l", 101, Utc::now()).is_err());
  }

  #[test]
  fn status_wire_shape() {
    let json = serde_json::to_value(AlertStatus::Suppressed {
      reason: SuppressReason::BelowThreshold,
    })
    .unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "state": "suppressed", "reason": "below_threshold" })
    );
  }
}
