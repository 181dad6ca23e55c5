use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub color: String,
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DealStatus {
    #[default]
    Open,
    Won,
    Lost,
    OnHold,
}

impl DealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Won => "Won",
            Self::Lost => "Lost",
            Self::OnHold => "OnHold",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "Won" => Ok(Self::Won),
            "Lost" => Ok(Self::Lost),
            "OnHold" => Ok(Self::OnHold),
            other => Err(format!("Unknown deal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DealPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl DealPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for DealPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            other => Err(format!("Unknown deal priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub company_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub contact_id: Uuid,
    pub organisation_id: Option<Uuid>,
    pub name: String,
    pub amount: f64,
    pub probability: i32,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: DealStatus,
    pub priority: DealPriority,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contact's placement inside one pipeline. At most one per (contact, pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPlacement {
    pub contact_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationTrigger {
    StageChange,
    DealAmountChange,
    ProbabilityChange,
}

impl AutomationTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StageChange => "stage_change",
            Self::DealAmountChange => "deal_amount_change",
            Self::ProbabilityChange => "probability_change",
        }
    }
}

impl FromStr for AutomationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage_change" => Ok(Self::StageChange),
            "deal_amount_change" => Ok(Self::DealAmountChange),
            "probability_change" => Ok(Self::ProbabilityChange),
            other => Err(format!("Unknown automation trigger: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Stage,
    Amount,
    Probability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    UpdateStage,
    UpdateProbability,
    SendNotification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationCondition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Stored rule attached to a pipeline. Nothing evaluates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: AutomationTrigger,
    pub conditions: Vec<AutomationCondition>,
    pub actions: Vec<AutomationAction>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Deal,
    Contact,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub stage: Stage,
    pub deals: Vec<Deal>,
    pub contacts: Vec<ContactPlacement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub pipeline_id: Uuid,
    pub name: String,
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub position: i32,
}

// Request payloads

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipelineRequest {
    pub name: String,
    pub description: Option<String>,
    pub stages: Option<Vec<StageInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePipelineRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStageRequest {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderStagesRequest {
    pub stage_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealRequest {
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub contact_id: Uuid,
    pub organisation_id: Option<Uuid>,
    pub name: String,
    pub amount: Option<f64>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<DealStatus>,
    pub priority: Option<DealPriority>,
}

/// Non-positional deal fields. Stage and position only change through a move.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDealRequest {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<DealStatus>,
    pub priority: Option<DealPriority>,
    pub organisation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealFilter {
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactToPipelineRequest {
    pub contact_id: Uuid,
    pub stage_id: Uuid,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlacementRequest {
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
}

/// Body of the generic drag-and-drop move.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemRequest {
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub pipeline_id: Option<Uuid>,
    pub source_stage_id: Uuid,
    pub destination_stage_id: Uuid,
    #[serde(alias = "newIndex")]
    pub destination_index: usize,
    pub source_index: Option<usize>,
}

/// Body of the item-specific move endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub source_stage_id: Uuid,
    pub destination_stage_id: Uuid,
    #[serde(alias = "newIndex")]
    pub destination_index: usize,
    pub source_index: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRequest {
    pub pipeline_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: AutomationTrigger,
    #[serde(default)]
    pub conditions: Vec<AutomationCondition>,
    #[serde(default)]
    pub actions: Vec<AutomationAction>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<AutomationTrigger>,
    pub conditions: Option<Vec<AutomationCondition>>,
    pub actions: Option<Vec<AutomationAction>>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_request_accepts_new_index() {
        let source = Uuid::new_v4();
        let destination = Uuid::new_v4();
        let body = serde_json::json!({
            "sourceStageId": source,
            "destinationStageId": destination,
            "newIndex": 3,
        });
        let req: MoveRequest = match serde_json::from_value(body) {
            Ok(req) => req,
            Err(e) => panic!("newIndex body rejected: {e}"),
        };
        assert_eq!(req.destination_index, 3);
        assert_eq!(req.destination_stage_id, destination);

        let body = serde_json::json!({
            "itemType": "deal",
            "itemId": Uuid::new_v4(),
            "sourceStageId": source,
            "destinationStageId": destination,
            "newIndex": 1,
        });
        let req: MoveItemRequest = match serde_json::from_value(body) {
            Ok(req) => req,
            Err(e) => panic!("newIndex body rejected: {e}"),
        };
        assert_eq!(req.destination_index, 1);
        assert!(req.pipeline_id.is_none());
    }

    #[test]
    fn test_deal_status_round_trip() {
        for status in [
            DealStatus::Open,
            DealStatus::Won,
            DealStatus::Lost,
            DealStatus::OnHold,
        ] {
            assert_eq!(status.as_str().parse::<DealStatus>(), Ok(status));
        }
        assert!("Closed".parse::<DealStatus>().is_err());
        assert_eq!(DealStatus::default(), DealStatus::Open);
        assert_eq!(DealPriority::default(), DealPriority::Medium);
    }

    #[test]
    fn test_automation_wire_shape() {
        let req: CreateAutomationRequest = serde_json::from_value(serde_json::json!({
            "pipelineId": Uuid::nil(),
            "name": "Escalate",
            "trigger": "deal_amount_change",
            "conditions": [{"type": "amount", "value": 5000}],
            "actions": [{"type": "send_notification", "value": "sales@acme.test"}]
        }))
        .unwrap();
        assert_eq!(req.trigger, AutomationTrigger::DealAmountChange);
        assert_eq!(req.conditions[0].kind, ConditionType::Amount);
        assert_eq!(req.actions[0].kind, ActionType::SendNotification);
        assert!(req.is_active.is_none());
    }

    #[test]
    fn test_move_request_item_type() {
        let req: MoveItemRequest = serde_json::from_value(serde_json::json!({
            "itemType": "contact",
            "itemId": Uuid::nil(),
            "sourceStageId": Uuid::nil(),
            "destinationStageId": Uuid::nil(),
            "destinationIndex": 3
        }))
        .unwrap();
        assert_eq!(req.item_type, ItemType::Contact);
        assert_eq!(req.destination_index, 3);
        assert!(req.source_index.is_none());
    }
}
