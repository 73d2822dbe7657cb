//! Per-node state persisted next to the node's files.
use crate::error::Result;
use crate::files;
use consortium_network_configs::{Address, Enode, Node};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Descriptor of a node, read back by RPC clients and by later invocations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NodeInfo {
    pub name: String,
    pub role: String,
    pub org: String,
    pub ip: IpAddr,
    pub rpc_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enode: Option<String>,
    /// Address derived from the node key; names the node in the validator set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_addr: Option<Address>,
    #[serde(default)]
    pub accounts: BTreeMap<String, Address>,
    /// Set by `down`, cleared by `up`.
    #[serde(default)]
    pub stopped: bool,
}

impl NodeInfo {
    pub fn new(node: &Node, enode: Option<&Enode>, accounts: BTreeMap<String, Address>) -> Self {
        NodeInfo {
            name: node.name.clone(),
            role: node.kind.to_string(),
            org: node.org.clone(),
            ip: node.ip,
            rpc_port: node.rpc_port,
            enode: enode.map(ToString::to_string),
            node_addr: enode.map(Enode::node_address),
            accounts,
            stopped: false,
        }
    }

    pub fn load(node: &Node) -> Result<Option<Self>> {
        files::read_json_opt(&node.info_file())
    }

    pub fn save(&self, node: &Node) -> Result<()> {
        files::write_json(&node.info_file(), self)
    }

    /// Updates the `stopped` flag if the descriptor exists.
    pub(crate) fn mark_stopped(node: &Node, stopped: bool) -> Result<()> {
        match Self::load(node)? {
            Some(mut info) if info.stopped != stopped => {
                info.stopped = stopped;
                info.save(node)
            }
            _ => Ok(()),
        }
    }
}

/// What a running node resolves to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMarker {
    Process(ProcessMarker),
    Container(String),
}

/// A spawned node process. The start time tells the node apart from an unrelated process
/// that later got the same pid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessMarker {
    pub pid: u32,
    /// Start time in clock ticks since boot, where the host exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

impl LivenessMarker {
    pub fn load(node: &Node) -> Result<Option<Self>> {
        files::read_json_opt(&node.liveness_file())
    }

    pub fn save(&self, node: &Node) -> Result<()> {
        files::write_json(&node.liveness_file(), self)
    }

    pub fn remove(node: &Node) -> Result<()> {
        files::remove_file_if_exists(&node.liveness_file())
    }
}

impl std::fmt::Display for LivenessMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LivenessMarker::Process(process) => write!(f, "process {}", process.pid),
            LivenessMarker::Container(id) => write!(f, "container {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_format() {
        assert_eq!(
            serde_json::to_value(LivenessMarker::Process(ProcessMarker {
                pid: 42,
                start_time: Some(7)
            }))
            .unwrap(),
            serde_json::json!({"process": {"pid": 42, "start-time": 7}})
        );
        assert_eq!(
            serde_json::from_value::<LivenessMarker>(serde_json::json!({"process": {"pid": 42}}))
                .unwrap(),
            LivenessMarker::Process(ProcessMarker { pid: 42, start_time: None })
        );
        assert_eq!(
            serde_json::to_value(LivenessMarker::Container("abc".into())).unwrap(),
            serde_json::json!({"container": "abc"})
        );
    }
}
