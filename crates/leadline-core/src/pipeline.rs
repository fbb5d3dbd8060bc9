//! Pipeline projections: the kanban board, the CRM table and the summary
//! counters.
//!
//! All three are pure functions of an owner snapshot and never write back.
//! An owner with properties in several stages shows up in every matching
//! board column, while the table collapses the owner to one primary stage:
//! the highest-ranked stage among its properties.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  lead::{Owner, OwnerId, PropertyId},
  stage::{
    ChatbotStage, PipelineKind, RecordedStage, SalesStage, Stage, StageValue,
  },
};

// ─── Board ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageColumn {
  pub stage:          StageValue,
  /// Each owner at most once, in input order.
  pub owner_ids:      Vec<OwnerId>,
  /// Properties sitting in this stage.
  pub property_count: usize,
  /// Mean viability over the column's scored properties.
  pub avg_viability:  Option<f64>,
  /// Sum of listed prices in the column.
  pub total_value:    f64,
}

/// A stored stage value outside the enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFault {
  pub owner_id:    OwnerId,
  pub property_id: PropertyId,
  pub pipeline:    PipelineKind,
  pub value:       String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineBoard {
  pub pipeline:       PipelineKind,
  /// One column per stage, in pipeline order, including empty ones.
  pub columns:        Vec<StageColumn>,
  pub total_owners:   usize,
  /// Owners with no property on the board (none at all, or only unknown
  /// stages).
  pub unstaged_owners: Vec<OwnerId>,
  pub faults:         Vec<StageFault>,
}

pub fn board(owners: &[Owner], pipeline: PipelineKind) -> PipelineBoard {
  match pipeline {
    PipelineKind::Sales => board_for::<SalesStage>(owners),
    PipelineKind::Chatbot => board_for::<ChatbotStage>(owners),
  }
}

#[derive(Default)]
struct Acc {
  owner_ids:  Vec<OwnerId>,
  properties: usize,
  scores:     Vec<f64>,
  value:      f64,
}

fn board_for<S: Stage>(owners: &[Owner]) -> PipelineBoard {
  let stages = S::all();
  let mut acc: Vec<Acc> = stages.iter().map(|_| Acc::default()).collect();
  let mut unstaged_owners = Vec::new();
  let mut faults = Vec::new();

  for owner in owners {
    let mut placed = false;
    for property in &owner.properties {
      match S::of(property) {
        RecordedStage::Known(stage) => {
          let col = &mut acc[stage.rank()];
          if col.owner_ids.last() != Some(&owner.id) {
            col.owner_ids.push(owner.id);
          }
          col.properties += 1;
          col.scores.extend(property.viability_score);
          col.value += property.price.unwrap_or(0.0);
          placed = true;
        }
        RecordedStage::Unknown(raw) => faults.push(StageFault {
          owner_id:    owner.id,
          property_id: property.id,
          pipeline:    S::PIPELINE,
          value:       raw.clone(),
        }),
      }
    }
    if !placed {
      unstaged_owners.push(owner.id);
    }
  }

  let columns = stages
    .into_iter()
    .zip(acc)
    .map(|(stage, a)| StageColumn {
      stage:          stage.into_value(),
      owner_ids:      a.owner_ids,
      property_count: a.properties,
      avg_viability:  mean(&a.scores),
      total_value:    a.value,
    })
    .collect();

  PipelineBoard {
    pipeline: S::PIPELINE,
    columns,
    total_owners: owners.len(),
    unstaged_owners,
    faults,
  }
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    None
  } else {
    Some(values.iter().sum::<f64>() / values.len() as f64)
  }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// The highest known stage among the owner's properties.
pub fn primary_stage<S: Stage>(owner: &Owner) -> Option<S> {
  owner
    .properties
    .iter()
    .filter_map(|p| S::of(p).known())
    .max()
}

/// One row of the CRM table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerRow {
  pub owner_id:        OwnerId,
  pub name:            String,
  pub email:           String,
  pub phone:           String,
  pub property_count:  usize,
  pub primary_stage:   Option<StageValue>,
  pub avg_viability:   Option<f64>,
  /// Properties in `Onboarded` or `Active Client`.
  pub active_clients:  usize,
  pub last_contact_at: Option<DateTime<Utc>>,
}

pub fn table(owners: &[Owner], pipeline: PipelineKind) -> Vec<OwnerRow> {
  owners
    .iter()
    .map(|owner| {
      let primary = match pipeline {
        PipelineKind::Sales => {
          primary_stage::<SalesStage>(owner).map(Stage::into_value)
        }
        PipelineKind::Chatbot => {
          primary_stage::<ChatbotStage>(owner).map(Stage::into_value)
        }
      };
      let scores: Vec<f64> = owner
        .properties
        .iter()
        .filter_map(|p| p.viability_score)
        .collect();
      OwnerRow {
        owner_id:        owner.id,
        name:            owner.name.clone(),
        email:           owner.email.clone(),
        phone:           owner.phone.clone(),
        property_count:  owner.properties.len(),
        primary_stage:   primary,
        avg_viability:   mean(&scores),
        active_clients:  active_clients(owner),
        last_contact_at: owner.last_contact_at,
      }
    })
    .collect()
}

fn active_clients(owner: &Owner) -> usize {
  owner
    .properties
    .iter()
    .filter(|p| p.sales_pipeline_stage.known().is_some_and(SalesStage::is_client))
    .count()
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrmSummary {
  pub total_owners:     usize,
  pub total_properties: usize,
  /// Owners holding at least one `New Lead` property.
  pub new_leads:        usize,
  /// Owners with at least one signed-up property.
  pub active_clients:   usize,
}

pub fn summary(owners: &[Owner]) -> CrmSummary {
  let new_lead = |o: &&Owner| {
    o.properties
      .iter()
      .any(|p| p.sales_pipeline_stage.known() == Some(SalesStage::NewLead))
  };
  CrmSummary {
    total_owners:     owners.len(),
    total_properties: owners.iter().map(|o| o.properties.len()).sum(),
    new_leads:        owners.iter().filter(new_lead).count(),
    active_clients:   owners.iter().filter(|o| active_clients(o) > 0).count(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lead::fixtures::{owner, property};

  fn with_stages(
    id: PropertyId,
    owner_id: OwnerId,
    sales: SalesStage,
    chatbot: ChatbotStage,
  ) -> crate::lead::Property {
    let mut p = property(id, owner_id);
    p.sales_pipeline_stage = sales.into();
    p.chatbot_pipeline_stage = chatbot.into();
    p
  }

  fn column(board: &PipelineBoard, stage: impl Stage) -> &StageColumn {
    &board.columns[stage.rank()]
  }

  #[test]
  fn owner_appears_in_every_column_it_has_properties_in() {
    let mut a = with_stages(1, 1, SalesStage::Contacted, ChatbotStage::NoContact);
    a.viability_score = Some(6.0);
    let mut b = with_stages(2, 1, SalesStage::CallBooked, ChatbotStage::Replied);
    b.viability_score = Some(9.0);
    let c = with_stages(3, 1, SalesStage::CallBooked, ChatbotStage::Replied);
    let owners = vec![owner(1, vec![a, b, c])];

    let board = board(&owners, PipelineKind::Sales);
    assert_eq!(board.columns.len(), 8);
    assert_eq!(column(&board, SalesStage::Contacted).owner_ids, vec![1]);
    let booked = column(&board, SalesStage::CallBooked);
    assert_eq!(booked.owner_ids, vec![1]);
    assert_eq!(booked.property_count, 2);
    assert_eq!(booked.avg_viability, Some(9.0));
    assert_eq!(booked.total_value, 200_000.0);
    assert!(column(&board, SalesStage::NewLead).owner_ids.is_empty());
    assert_eq!(board.total_owners, 1);

    let rows = table(&owners, PipelineKind::Sales);
    assert_eq!(
      rows[0].primary_stage,
      Some(StageValue::Sales(SalesStage::CallBooked))
    );
    assert_eq!(rows[0].avg_viability, Some(7.5));
  }

  #[test]
  fn owners_without_properties_are_unstaged_not_dropped() {
    let owners = vec![owner(1, vec![]), owner(2, vec![property(20, 2)])];
    let board = board(&owners, PipelineKind::Chatbot);
    assert_eq!(board.total_owners, 2);
    assert_eq!(board.unstaged_owners, vec![1]);
    assert_eq!(column(&board, ChatbotStage::NoContact).owner_ids, vec![2]);

    let rows = table(&owners, PipelineKind::Chatbot);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].primary_stage, None);
    assert_eq!(rows[0].property_count, 0);
  }

  #[test]
  fn unknown_stage_is_flagged_not_counted() {
    let mut p = property(1, 1);
    p.sales_pipeline_stage = RecordedStage::Unknown("Lost".into());
    let owners = vec![owner(1, vec![p])];

    let board = board(&owners, PipelineKind::Sales);
    assert_eq!(board.faults.len(), 1);
    assert_eq!(board.faults[0].value, "Lost");
    assert_eq!(board.unstaged_owners, vec![1]);
    let placed: usize = board.columns.iter().map(|c| c.property_count).sum();
    assert_eq!(placed, 0);
  }

  #[test]
  fn table_primary_is_highest_board_column() {
    let owners = vec![
      owner(1, vec![
        with_stages(1, 1, SalesStage::Interested, ChatbotStage::Replied),
        with_stages(2, 1, SalesStage::NewLead, ChatbotStage::Closed),
      ]),
      owner(2, vec![with_stages(3, 2, SalesStage::ActiveClient, ChatbotStage::NoContact)]),
    ];

    for pipeline in [PipelineKind::Sales, PipelineKind::Chatbot] {
      let board = board(&owners, pipeline);
      for row in table(&owners, pipeline) {
        let highest = board
          .columns
          .iter()
          .rev()
          .find(|c| c.owner_ids.contains(&row.owner_id))
          .map(|c| c.stage);
        assert_eq!(row.primary_stage, highest);
      }
    }
  }

  #[test]
  fn projections_are_idempotent() {
    let owners = vec![
      owner(1, vec![with_stages(1, 1, SalesStage::Onboarded, ChatbotStage::Closed)]),
      owner(2, vec![property(2, 2), property(3, 2)]),
    ];
    assert_eq!(board(&owners, PipelineKind::Sales), board(&owners, PipelineKind::Sales));
    assert_eq!(table(&owners, PipelineKind::Sales), table(&owners, PipelineKind::Sales));

    let s = summary(&owners);
    assert_eq!(s, CrmSummary {
      total_owners:     2,
      total_properties: 3,
      new_leads:        1,
      active_clients:   1,
    });
    assert_eq!(s, summary(&owners));
  }
}
