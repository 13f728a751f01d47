//! Remote procedure messages: PING, FIND_NODE, FIND_VALUE, STORE.
//!
//! Every request and response carries the caller's own [`NodeInfo`] so the
//! receiving side can observe it into its routing table.

use super::entities::{DhtValue, NodeId, NodeInfo};
use serde::{Deserialize, Serialize};

/// Request sent to a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rpc", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DhtRequest {
    /// Liveness check.
    Ping {
        /// Caller
        from: NodeInfo,
    },
    /// Ask for the k closest nodes to `target`.
    FindNode {
        /// Caller
        from: NodeInfo,
        /// Lookup target
        target: NodeId,
    },
    /// Ask for the value under `key`, or the closest nodes otherwise.
    FindValue {
        /// Caller
        from: NodeInfo,
        /// Value key
        key: NodeId,
    },
    /// Ask the node to hold `value` under `key`.
    Store {
        /// Caller
        from: NodeInfo,
        /// Value key
        key: NodeId,
        /// Signed value
        value: DhtValue,
    },
}

impl DhtRequest {
    /// The caller's record.
    pub fn caller(&self) -> &NodeInfo {
        match self {
            Self::Ping { from }
            | Self::FindNode { from, .. }
            | Self::FindValue { from, .. }
            | Self::Store { from, .. } => from,
        }
    }

    /// RPC name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping { .. } => "PING",
            Self::FindNode { .. } => "FIND_NODE",
            Self::FindValue { .. } => "FIND_VALUE",
            Self::Store { .. } => "STORE",
        }
    }
}

/// Reply from a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rpc", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DhtResponse {
    /// Answer to PING.
    Pong {
        /// Responder
        from: NodeInfo,
    },
    /// Closest known nodes.
    Nodes {
        /// Responder
        from: NodeInfo,
        /// Up to k nodes, closest first
        nodes: Vec<NodeInfo>,
    },
    /// FIND_VALUE hit.
    Value {
        /// Responder
        from: NodeInfo,
        /// The stored value
        value: DhtValue,
    },
    /// STORE accepted.
    Stored {
        /// Responder
        from: NodeInfo,
    },
    /// Request refused.
    Rejected {
        /// Responder
        from: NodeInfo,
        /// Why
        reason: String,
    },
}

impl DhtResponse {
    /// The responder's record.
    pub fn responder(&self) -> &NodeInfo {
        match self {
            Self::Pong { from }
            | Self::Nodes { from, .. }
            | Self::Value { from, .. }
            | Self::Stored { from }
            | Self::Rejected { from, .. } => from,
        }
    }
}
