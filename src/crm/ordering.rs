//! Lane arithmetic for the drag-and-drop move.
//!
//! A lane is the ordered list of items of one kind inside one stage. Positions
//! in a lane are always `0..n-1`; these functions compute which rows have to
//! change so that stays true after a move, a removal or an append. They do no
//! I/O so both storage backends share them.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    /// Only the rows whose stage or position differ from what was read.
    pub changes: Vec<PositionChange>,
    /// Final index of the moved item in its destination lane.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    #[error("Item is not in the source stage")]
    ItemNotInSource,
    #[error("Item moved since it was read (expected index {expected}, found {actual})")]
    StalePosition { expected: usize, actual: usize },
    #[error("Stage order must list every stage of the pipeline exactly once")]
    NotAPermutation,
}

/// Orders a lane by position, ties broken by insertion time.
pub fn sort_lane(lane: &mut [Placement]) {
    lane.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

pub fn next_position(lane: &[Placement]) -> i32 {
    lane.iter().map(|p| p.position + 1).max().unwrap_or(0)
}

/// Renumbers a lane contiguously, e.g. after one of its items was removed.
pub fn plan_compaction(lane: &[Placement]) -> Vec<PositionChange> {
    let mut sorted = lane.to_vec();
    sort_lane(&mut sorted);
    renumber(&sorted, &original_slots(lane, &[]))
}

/// Splices `item_id` out of `source` and into `destination` at
/// `destination_index`, clamped to the destination length.
///
/// When the destination stage is the item's own stage the move is a reorder
/// and `destination` is ignored. `expected_source_index` is the index the
/// caller saw; a mismatch means someone else moved things in between.
pub fn plan_move(
    source: &[Placement],
    destination: &[Placement],
    item_id: Uuid,
    destination_stage: Uuid,
    destination_index: usize,
    expected_source_index: Option<usize>,
) -> Result<MovePlan, OrderingError> {
    let mut source_lane = source.to_vec();
    sort_lane(&mut source_lane);

    let current = source_lane
        .iter()
        .position(|p| p.id == item_id)
        .ok_or(OrderingError::ItemNotInSource)?;

    if let Some(expected) = expected_source_index {
        if expected != current {
            return Err(OrderingError::StalePosition {
                expected,
                actual: current,
            });
        }
    }

    let mut item = source_lane.remove(current);
    let same_stage = item.stage_id == destination_stage;
    item.stage_id = destination_stage;

    let before = if same_stage {
        original_slots(source, &[])
    } else {
        original_slots(source, destination)
    };

    if same_stage {
        let index = destination_index.min(source_lane.len());
        source_lane.insert(index, item);
        return Ok(MovePlan {
            changes: renumber(&source_lane, &before),
            index,
        });
    }

    let mut destination_lane: Vec<Placement> = destination
        .iter()
        .filter(|p| p.id != item_id)
        .cloned()
        .collect();
    sort_lane(&mut destination_lane);

    let index = destination_index.min(destination_lane.len());
    destination_lane.insert(index, item);

    let mut changes = renumber(&source_lane, &before);
    changes.extend(renumber(&destination_lane, &before));

    Ok(MovePlan { changes, index })
}

/// Validates that `requested` is a permutation of `current` and returns the
/// new order for every stage.
pub fn plan_stage_reorder(
    current: &[Uuid],
    requested: &[Uuid],
) -> Result<Vec<(Uuid, i32)>, OrderingError> {
    if current.len() != requested.len() {
        return Err(OrderingError::NotAPermutation);
    }

    let known: HashSet<&Uuid> = current.iter().collect();
    let mut seen = HashSet::with_capacity(requested.len());
    for id in requested {
        if !known.contains(id) || !seen.insert(id) {
            return Err(OrderingError::NotAPermutation);
        }
    }

    Ok(requested
        .iter()
        .enumerate()
        .map(|(order, id)| (*id, order as i32))
        .collect())
}

fn original_slots(a: &[Placement], b: &[Placement]) -> HashMap<Uuid, (Uuid, i32)> {
    a.iter()
        .chain(b.iter())
        .map(|p| (p.id, (p.stage_id, p.position)))
        .collect()
}

fn renumber(lane: &[Placement], before: &HashMap<Uuid, (Uuid, i32)>) -> Vec<PositionChange> {
    lane.iter()
        .enumerate()
        .filter_map(|(index, p)| {
            let slot = (p.stage_id, index as i32);
            if before.get(&p.id) == Some(&slot) {
                None
            } else {
                Some(PositionChange {
                    id: p.id,
                    stage_id: p.stage_id,
                    position: index as i32,
                })
            }
        })
        .collect()
}
