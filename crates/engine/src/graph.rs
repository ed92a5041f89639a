//! Graph validation and lookup: run this before persisting, activating or
//! interpreting a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. Exactly one trigger node, with no incoming edges.
//! 4. Trigger, action and delay nodes have at most one outgoing edge, and
//!    none of their edges carry a branch label.
//! 5. Condition nodes have exactly two outgoing edges labeled `true` and
//!    `false`; approval nodes `approved` and `rejected`.
//! 6. Condition expressions parse; delays are longer than zero and no
//!    longer than `DelayConfig::MAX_DAYS`.
//!
//! Cycles are allowed (a reminder loop through a delay is legitimate);
//! the executor bounds the number of node visits per advance instead.

use std::collections::{HashMap, HashSet};

use crate::condition::Condition;
use crate::error::ValidationError;
use crate::models::{BranchLabel, DelayConfig, Edge, Node, NodeConfig, NodeType, WorkflowDefinition};

/// A validated, indexed view of a [`WorkflowDefinition`].
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    nodes: HashMap<&'a str, &'a Node>,
    outgoing: HashMap<&'a str, Vec<&'a Edge>>,
    conditions: HashMap<&'a str, Condition>,
    trigger_id: &'a str,
}

impl<'a> WorkflowGraph<'a> {
    /// Validate `definition` and index it for interpretation.
    pub fn build(definition: &'a WorkflowDefinition) -> Result<Self, ValidationError> {
        // -------------------------------------------------------------------
        // 1. Ensure node IDs are unique
        // -------------------------------------------------------------------
        let mut nodes: HashMap<&str, &Node> = HashMap::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            if nodes.insert(node.id.as_str(), node).is_some() {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        // -------------------------------------------------------------------
        // 2. Validate edge endpoints
        // -------------------------------------------------------------------
        let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut has_incoming: HashSet<&str> = HashSet::new();
        for edge in &definition.edges {
            if !nodes.contains_key(edge.from.as_str()) {
                return Err(ValidationError::UnknownNodeReference {
                    node_id: edge.from.clone(),
                    side: "from",
                });
            }
            if !nodes.contains_key(edge.to.as_str()) {
                return Err(ValidationError::UnknownNodeReference {
                    node_id: edge.to.clone(),
                    side: "to",
                });
            }
            outgoing.entry(edge.from.as_str()).or_default().push(edge);
            has_incoming.insert(edge.to.as_str());
        }

        // -------------------------------------------------------------------
        // 3. Exactly one trigger
        // -------------------------------------------------------------------
        let triggers: Vec<&Node> = definition
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Trigger)
            .collect();
        let trigger = match triggers.as_slice() {
            [] => return Err(ValidationError::MissingTrigger),
            [only] => *only,
            many => return Err(ValidationError::MultipleTriggers(many.len())),
        };
        if has_incoming.contains(trigger.id.as_str()) {
            return Err(ValidationError::TriggerHasIncomingEdge(trigger.id.clone()));
        }

        // -------------------------------------------------------------------
        // 4-6. Per-node rules
        // -------------------------------------------------------------------
        let mut conditions = HashMap::new();
        for node in &definition.nodes {
            let edges = outgoing.get(node.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            match &node.config {
                NodeConfig::Trigger(_) | NodeConfig::Action(_) => check_linear(node, edges)?,
                NodeConfig::Delay(cfg) => {
                    check_linear(node, edges)?;
                    if cfg.amount == 0 {
                        return Err(ValidationError::InvalidNodeConfig {
                            node_id: node.id.clone(),
                            message: "delay amount must be greater than zero".into(),
                        });
                    }
                    if cfg.duration() > DelayConfig::max_duration() {
                        return Err(ValidationError::InvalidNodeConfig {
                            node_id: node.id.clone(),
                            message: format!("delay must not exceed {} days", DelayConfig::MAX_DAYS),
                        });
                    }
                }
                NodeConfig::Condition(cfg) => {
                    check_branches(node, edges, [BranchLabel::True, BranchLabel::False], "{true, false}")?;
                    let condition = cfg.expression.parse::<Condition>().map_err(|e| {
                        ValidationError::InvalidExpression {
                            node_id: node.id.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    conditions.insert(node.id.as_str(), condition);
                }
                NodeConfig::Approval(_) => check_branches(
                    node,
                    edges,
                    [BranchLabel::Approved, BranchLabel::Rejected],
                    "{approved, rejected}",
                )?,
            }
        }

        Ok(Self {
            nodes,
            outgoing,
            conditions,
            trigger_id: trigger.id.as_str(),
        })
    }

    pub fn node(&self, node_id: &str) -> Option<&'a Node> {
        self.nodes.get(node_id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn trigger_id(&self) -> &'a str {
        self.trigger_id
    }

    /// Target of the single unlabeled outgoing edge, if any.
    pub fn next(&self, node_id: &str) -> Option<&'a str> {
        self.outgoing
            .get(node_id)
            .and_then(|edges| edges.iter().find(|e| e.branch.is_none()))
            .map(|e| e.to.as_str())
    }

    /// Target of the outgoing edge labeled `label`, if any.
    pub fn branch_target(&self, node_id: &str, label: BranchLabel) -> Option<&'a str> {
        self.outgoing
            .get(node_id)
            .and_then(|edges| edges.iter().find(|e| e.branch == Some(label)))
            .map(|e| e.to.as_str())
    }

    /// The parsed expression of a condition node.
    pub fn condition(&self, node_id: &str) -> Option<&Condition> {
        self.conditions.get(node_id)
    }
}

fn check_linear(node: &Node, edges: &[&Edge]) -> Result<(), ValidationError> {
    if edges.len() > 1 {
        return Err(ValidationError::TooManyOutgoingEdges {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            found: edges.len(),
        });
    }
    if let Some(label) = edges.iter().find_map(|e| e.branch) {
        return Err(ValidationError::UnexpectedBranchLabel {
            node_id: node.id.clone(),
            label,
        });
    }
    Ok(())
}

fn check_branches(
    node: &Node,
    edges: &[&Edge],
    labels: [BranchLabel; 2],
    expected: &'static str,
) -> Result<(), ValidationError> {
    let ok = edges.len() == 2
        && labels
            .iter()
            .all(|label| edges.iter().filter(|e| e.branch == Some(*label)).count() == 1);
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidBranches {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            expected,
        })
    }
}
