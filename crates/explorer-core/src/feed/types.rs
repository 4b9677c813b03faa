//! Feed event types.
//!
//! Upstream payloads are treated as opaque JSON: each `from_payload` constructor extracts
//! only the fields the explorer needs and ignores everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::FeedError;

/// Upstream topics the distributor subscribes to at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedTopic {
    /// New blocks attached to the ledger.
    Blocks,
    /// Status changes for individual records.
    RecordMetadata,
    /// Checkpoint (milestone) confirmations.
    Checkpoints,
}

impl FeedTopic {
    pub const ALL: [FeedTopic; 3] = [Self::Blocks, Self::RecordMetadata, Self::Checkpoints];

    /// Topic name used on the upstream wire and in metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::RecordMetadata => "block-metadata",
            Self::Checkpoints => "milestones",
        }
    }

    #[must_use]
    pub fn from_wire(topic: &str) -> Option<Self> {
        match topic {
            "blocks" => Some(Self::Blocks),
            "block-metadata" => Some(Self::RecordMetadata),
            "milestones" => Some(Self::Checkpoints),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network-wide checkpoint confirming a batch of prior records.
///
/// Read-only once stored in the history. Deduplicated by `anchor_record_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEvent {
    /// Id of the record that carries the checkpoint.
    #[serde(alias = "blockId")]
    pub anchor_record_id: String,
    #[serde(alias = "milestoneId")]
    pub checkpoint_id: String,
    /// Monotonic within a network.
    #[serde(alias = "milestoneIndex")]
    pub index: u32,
    #[serde(alias = "timestamp")]
    pub timestamp_seconds: u64,
}

impl CheckpointEvent {
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidPayload`] if a required field is missing or mistyped.
    pub fn from_payload(payload: &Value) -> Result<Self, FeedError> {
        let event = Self::deserialize(payload)
            .map_err(|e| FeedError::InvalidPayload(format!("checkpoint: {e}")))?;

        if event.anchor_record_id.is_empty() {
            return Err(FeedError::InvalidPayload("checkpoint: empty anchor record id".into()));
        }

        Ok(event)
    }
}

/// Cached status snapshot for a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadataEntry {
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_by_checkpoint: Option<u32>,
    pub is_solid: bool,
    pub is_conflicting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_reason: Option<u8>,
    pub is_included: bool,
}

impl RecordMetadataEntry {
    #[must_use]
    pub fn new(record_id: impl Into<String>) -> Self {
        Self { record_id: record_id.into(), ..Default::default() }
    }

    /// Returns a new entry with the fields present in `update` overwritten.
    ///
    /// Fields absent from the update keep their current value.
    #[must_use]
    pub fn merged_with(&self, update: &RecordMetadataUpdate) -> Self {
        Self {
            record_id: self.record_id.clone(),
            checkpoint_index: update.checkpoint_index.or(self.checkpoint_index),
            referenced_by_checkpoint: update
                .referenced_by_checkpoint
                .or(self.referenced_by_checkpoint),
            is_solid: update.is_solid.unwrap_or(self.is_solid),
            is_conflicting: update.is_conflicting.unwrap_or(self.is_conflicting),
            conflict_reason: update.conflict_reason.or(self.conflict_reason),
            is_included: update.is_included.unwrap_or(self.is_included),
        }
    }
}

/// Partial metadata notification. `None` means "not present in this notification".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadataUpdate {
    pub record_id: String,
    pub checkpoint_index: Option<u32>,
    pub referenced_by_checkpoint: Option<u32>,
    pub is_solid: Option<bool>,
    pub is_conflicting: Option<bool>,
    pub conflict_reason: Option<u8>,
    pub is_included: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecordMetadata {
    #[serde(alias = "recordId")]
    block_id: String,
    #[serde(default)]
    milestone_index: Option<u32>,
    #[serde(default)]
    referenced_by_milestone_index: Option<u32>,
    #[serde(default)]
    is_solid: Option<bool>,
    #[serde(default)]
    ledger_inclusion_state: Option<String>,
    #[serde(default)]
    conflict_reason: Option<u8>,
}

impl RecordMetadataUpdate {
    /// Extracts a metadata update from an upstream notification.
    ///
    /// `ledgerInclusionState` drives both `is_included` and `is_conflicting`, which describe
    /// the block's transaction in the ledger:
    ///
    /// - `included`: included, not conflicting
    /// - `conflicting`: conflicting, not included
    /// - `noTransaction`: neither. The block carries no transaction, so there is nothing to
    ///   include. Whether it is confirmed is read from `referenced_by_checkpoint`.
    ///
    /// A notification without the field, or with a state not listed above, leaves both
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidPayload`] if the record id is missing or a field is mistyped.
    pub fn from_payload(payload: &Value) -> Result<Self, FeedError> {
        let raw = RawRecordMetadata::deserialize(payload)
            .map_err(|e| FeedError::InvalidPayload(format!("record metadata: {e}")))?;

        if raw.block_id.is_empty() {
            return Err(FeedError::InvalidPayload("record metadata: empty record id".into()));
        }

        let (is_included, is_conflicting) = match raw.ledger_inclusion_state.as_deref() {
            Some("included") => (Some(true), Some(false)),
            Some("conflicting") => (Some(false), Some(true)),
            Some("noTransaction") => (Some(false), Some(false)),
            _ => (None, None),
        };

        Ok(Self {
            record_id: raw.block_id,
            checkpoint_index: raw.milestone_index,
            referenced_by_checkpoint: raw.referenced_by_milestone_index,
            is_solid: raw.is_solid,
            is_conflicting,
            conflict_reason: raw.conflict_reason,
            is_included,
        })
    }
}

/// Newly attached block. Broadcast as-is, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    pub block_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<u32>,
    /// Remaining upstream fields, passed through untouched.
    pub properties: Value,
}

impl BlockEvent {
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidPayload`] if the payload carries no block id.
    pub fn from_payload(payload: &Value) -> Result<Self, FeedError> {
        let block_id = payload
            .get("blockId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FeedError::InvalidPayload("block: missing blockId".into()))?;

        let payload_type = payload
            .get("payloadType")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok());

        Ok(Self { block_id: block_id.to_string(), payload_type, properties: payload.clone() })
    }
}

/// Event content delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedPayload {
    Block(BlockEvent),
    RecordMetadata(RecordMetadataEntry),
    Checkpoint(CheckpointEvent),
}

impl FeedPayload {
    #[must_use]
    pub fn topic(&self) -> FeedTopic {
        match self {
            Self::Block(_) => FeedTopic::Blocks,
            Self::RecordMetadata(_) => FeedTopic::RecordMetadata,
            Self::Checkpoint(_) => FeedTopic::Checkpoints,
        }
    }
}

/// A single delivery: the event content plus the receiving subscription's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedUpdate {
    pub subscription_id: String,
    #[serde(flatten)]
    pub payload: FeedPayload,
}
