//! Match scoring for consumer listings.
//!
//! Hard filters are binary: a listing that misses any of them is excluded
//! and never scored. Survivors get a `match_pct` in 60..=100 from the soft
//! voice-context rank.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::b2c::{Amenity, Listing, StructuredFilters};

/// Score of a listing that passes every hard filter but matches nothing in
/// the voice context.
const BASE_PCT: f64 = 60.0;
/// Share of the score driven by the voice-context rank.
const VOICE_PCT: f64 = 40.0;
/// Rank used when the user has given no voice context at all.
const NEUTRAL_RANK: f64 = 0.5;

const STOPWORDS: &[&str] = &[
  "that", "this", "with", "from", "have", "would", "like", "want", "near",
  "close", "some", "very", "really", "something", "place", "looking", "need",
];

/// The first hard filter a listing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "detail", rename_all = "snake_case")]
pub enum FilterMiss {
  RentOrBuy,
  Budget,
  Bedrooms,
  Surface,
  Commune,
  PropertyType,
  Amenity(Amenity),
  MonthlyCharges,
}

pub fn hard_filter(
  filters: &StructuredFilters,
  listing: &Listing,
) -> Result<(), FilterMiss> {
  if filters.rent_or_buy != listing.rent_or_buy {
    return Err(FilterMiss::RentOrBuy);
  }
  if listing.price < filters.budget_min || listing.price > filters.budget_max {
    return Err(FilterMiss::Budget);
  }
  if let Some(min) = filters.bedrooms
    && listing.bedrooms.is_none_or(|b| b < min)
  {
    return Err(FilterMiss::Bedrooms);
  }
  if let Some(sqm) = listing.surface_m2 {
    let too_small = filters.sqm_min.is_some_and(|min| sqm < min);
    let too_large = filters.sqm_max.is_some_and(|max| sqm > max);
    if too_small || too_large {
      return Err(FilterMiss::Surface);
    }
  } else if filters.sqm_min.is_some() {
    return Err(FilterMiss::Surface);
  }
  if !filters.communes.is_empty()
    && !listing
      .commune
      .as_deref()
      .is_some_and(|c| contains_ignore_case(&filters.communes, c))
  {
    return Err(FilterMiss::Commune);
  }
  if !filters.property_types.is_empty()
    && !listing
      .property_type
      .as_deref()
      .is_some_and(|t| contains_ignore_case(&filters.property_types, t))
  {
    return Err(FilterMiss::PropertyType);
  }

  let required = [
    (filters.parking, Amenity::Parking),
    (filters.balcony, Amenity::Balcony),
    (filters.elevator, Amenity::Elevator),
    (filters.pets, Amenity::Pets),
    (filters.furnished == Some(true), Amenity::Furnished),
  ];
  for (wanted, amenity) in required {
    if wanted && !listing.amenities.contains(&amenity) {
      return Err(FilterMiss::Amenity(amenity));
    }
  }

  if let Some(max) = filters.max_monthly_charges
    && listing.monthly_charges.is_some_and(|c| c > max)
  {
    return Err(FilterMiss::MonthlyCharges);
  }
  Ok(())
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
  haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

/// Lowercased alphanumeric words of `s`.
fn words(s: &str) -> impl Iterator<Item = String> + '_ {
  s.split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
}

/// Fraction of meaningful voice-context keywords found as whole words in the
/// listing text.
pub fn voice_rank(voice_context: &str, listing: &Listing) -> f64 {
  let keywords: Vec<String> = words(voice_context)
    .filter(|w| w.chars().count() >= 4 && !STOPWORDS.contains(&w.as_str()))
    .collect();
  if keywords.is_empty() {
    return NEUTRAL_RANK;
  }

  let text: HashSet<String> = [
    listing.title.as_str(),
    listing.description.as_str(),
    listing.commune.as_deref().unwrap_or_default(),
    listing.property_type.as_deref().unwrap_or_default(),
  ]
  .into_iter()
  .flat_map(words)
  .collect();

  let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
  hits as f64 / keywords.len() as f64
}

/// `None` when a hard filter excludes the listing. `external_rank` (0–1),
/// when supplied by a ranking service, replaces the local keyword rank.
pub fn match_pct(
  filters: &StructuredFilters,
  voice_context: &str,
  listing: &Listing,
  external_rank: Option<f64>,
) -> Option<u8> {
  hard_filter(filters, listing).ok()?;
  let rank = external_rank
    .unwrap_or_else(|| voice_rank(voice_context, listing))
    .clamp(0.0, 1.0);
  Some((BASE_PCT + VOICE_PCT * rank).round() as u8)
}
