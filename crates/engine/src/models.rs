//! Workflow definition model.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They serialise to/from the JSONB `definition` column of the
//! `workflow_definitions` table. Node configuration is a closed set of
//! typed shapes; loosely typed editor payloads go through
//! [`WorkflowDefinition::from_raw`] before they can be stored.

use std::fmt;
use std::str::FromStr;

use actions::JsonMap;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::graph::WorkflowGraph;

// ---------------------------------------------------------------------------
// Trigger type & status
// ---------------------------------------------------------------------------

/// Domain event type a workflow is bound to, e.g. `client_created`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerType(String);

impl TriggerType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TriggerType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Only active definitions are matched against incoming events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    Active,
    Inactive,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown definition status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Node configuration
// ---------------------------------------------------------------------------

/// Entry point. Which event starts the workflow lives on the definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {}

/// Two-way branch over the execution context, e.g. `payload.amount > 100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    pub expression: String,
}

/// One call through the action adapter. String values in `params` may
/// contain `{{path}}` placeholders resolved against the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    pub action_type: String,
    #[serde(default)]
    pub params: JsonMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// Suspend for `amount` × `unit` of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    pub amount: u32,
    pub unit: DelayUnit,
}

impl DelayConfig {
    /// Longest delay a definition may declare, in days.
    pub const MAX_DAYS: i64 = 3650;

    pub fn max_duration() -> Duration {
        Duration::days(Self::MAX_DAYS)
    }

    pub fn duration(&self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            DelayUnit::Seconds => Duration::seconds(amount),
            DelayUnit::Minutes => Duration::minutes(amount),
            DelayUnit::Hours => Duration::hours(amount),
            DelayUnit::Days => Duration::days(amount),
            DelayUnit::Weeks => Duration::weeks(amount),
        }
    }
}

/// Suspend until a human approves or rejects.
///
/// `timeout_hours` is informational: nothing auto-decides when it passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<u32>,
}

/// Closed set of per-type node configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Trigger(TriggerConfig),
    Condition(ConditionConfig),
    Action(ActionConfig),
    Delay(DelayConfig),
    Approval(ApprovalConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Condition,
    Action,
    Delay,
    Approval,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Condition => "condition",
            Self::Action => "action",
            Self::Delay => "delay",
            Self::Approval => "approval",
        };
        f.write_str(s)
    }
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Trigger(_) => NodeType::Trigger,
            Self::Condition(_) => NodeType::Condition,
            Self::Action(_) => NodeType::Action,
            Self::Delay(_) => NodeType::Delay,
            Self::Approval(_) => NodeType::Approval,
        }
    }

    /// Validate an untyped editor blob into a typed config.
    ///
    /// Unknown node types, unknown fields and missing fields are all
    /// reported as [`ValidationError::InvalidNodeConfig`].
    pub fn from_raw(node_id: &str, node_type: &str, data: Value) -> Result<Self, ValidationError> {
        // Editors send `null` for nodes without settings.
        let data = match data {
            Value::Null => Value::Object(JsonMap::new()),
            other => other,
        };
        match node_type {
            "trigger" => parse(node_id, data).map(Self::Trigger),
            "condition" => parse(node_id, data).map(Self::Condition),
            "action" => parse(node_id, data).map(Self::Action),
            "delay" => parse(node_id, data).map(Self::Delay),
            "approval" => parse(node_id, data).map(Self::Approval),
            other => Err(ValidationError::InvalidNodeConfig {
                node_id: node_id.to_owned(),
                message: format!("unknown node type '{other}'"),
            }),
        }
    }
}

fn parse<T: DeserializeOwned>(node_id: &str, data: Value) -> Result<T, ValidationError> {
    serde_json::from_value(data).map_err(|e| ValidationError::InvalidNodeConfig {
        node_id: node_id.to_owned(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Node & Edge
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self { id: id.into(), config }
    }

    pub fn trigger(id: impl Into<String>) -> Self {
        Self::new(id, NodeConfig::Trigger(TriggerConfig::default()))
    }

    pub fn condition(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeConfig::Condition(ConditionConfig {
                expression: expression.into(),
            }),
        )
    }

    pub fn action(id: impl Into<String>, action_type: impl Into<String>, params: JsonMap) -> Self {
        Self::new(
            id,
            NodeConfig::Action(ActionConfig {
                action_type: action_type.into(),
                params,
            }),
        )
    }

    pub fn delay(id: impl Into<String>, amount: u32, unit: DelayUnit) -> Self {
        Self::new(id, NodeConfig::Delay(DelayConfig { amount, unit }))
    }

    pub fn approval(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeConfig::Approval(ApprovalConfig {
                message: message.into(),
                details: None,
                timeout_hours: None,
            }),
        )
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

/// Tag on the two outgoing edges of a condition or approval node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchLabel {
    True,
    False,
    Approved,
    Rejected,
}

impl From<bool> for BranchLabel {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl fmt::Display for BranchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "true",
            Self::False => "false",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchLabel>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            branch: None,
        }
    }

    pub fn labeled(from: impl Into<String>, to: impl Into<String>, branch: BranchLabel) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            branch: Some(branch),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub trigger_type: TriggerType,
    pub status: DefinitionStatus,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Build an inactive definition. Call [`validate`](Self::validate)
    /// before activating it.
    pub fn new(
        name: impl Into<String>,
        trigger_type: impl Into<TriggerType>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger_type: trigger_type.into(),
            status: DefinitionStatus::Inactive,
            nodes,
            edges,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: DefinitionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Check every structural invariant of the graph.
    pub fn validate(&self) -> Result<(), ValidationError> {
        WorkflowGraph::build(self).map(|_| ())
    }

    /// Validate an editor payload into a typed definition.
    pub fn from_raw(raw: RawDefinition) -> Result<Self, ValidationError> {
        let nodes = raw
            .nodes
            .into_iter()
            .map(|n| {
                let config = NodeConfig::from_raw(&n.id, &n.node_type, n.data)?;
                Ok(Node { id: n.id, config })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let mut definition = Self::new(raw.name, raw.trigger_type, nodes, raw.edges);
        if let Some(id) = raw.id {
            definition.id = id;
        }
        if let Some(status) = raw.status {
            definition.status = status;
        }
        definition.validate()?;
        Ok(definition)
    }

    /// Replace one node's configuration.
    ///
    /// The whole graph is re-validated; on failure the definition is left
    /// exactly as it was.
    pub fn set_node_config(&mut self, node_id: &str, config: NodeConfig) -> Result<(), ValidationError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| ValidationError::UnknownNode(node_id.to_owned()))?;

        let previous = std::mem::replace(&mut self.nodes[index].config, config);
        if let Err(e) = self.validate() {
            self.nodes[index].config = previous;
            return Err(e);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw editor payloads
// ---------------------------------------------------------------------------

/// A node as the visual editor sends it: a type name plus an untyped blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: Value,
}

/// A definition as the visual editor sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDefinition {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub status: Option<DefinitionStatus>,
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}
