//! Peer discovery: every node learns the whole validator set.
//!
//! Validators get their identity from the joint BFT setup. Every other node gets a node key of
//! its own, so that it keeps one identity across restarts.
use crate::delegates::NodeKeyTool;
use crate::error::{Error, Result};
use crate::files;
use consortium_network_configs::{Enode, Network, Node};

/// Rewrites the placeholder endpoint of each raw peer identifier with the endpoint of the
/// validator at the same position, as seen from inside the network.
pub fn rewrite(enodes: &[Enode], validators: &[Node], containerized: bool) -> Result<Vec<Enode>> {
    if enodes.len() != validators.len() {
        return Err(Error::KeySetMismatch {
            what: "peer identifiers",
            expected: validators.len(),
            found: enodes.len(),
        });
    }
    enodes
        .iter()
        .zip(validators)
        .map(|(enode, validator)| {
            let (ip, port) = validator
                .p2p_endpoint(containerized)
                .ok_or_else(|| Error::MissingContainerEndpoint(validator.name.clone()))?;
            Ok(enode.with_endpoint(ip, port))
        })
        .collect()
}

/// Rewrites the peer list and writes it into every node, validators and auxiliary nodes alike.
pub fn propagate(net: &Network, enodes: &[Enode], containerized: bool) -> Result<Vec<Enode>> {
    let rewritten = rewrite(enodes, &net.validators, containerized)?;
    let list: Vec<String> = rewritten.iter().map(ToString::to_string).collect();
    for node in net.nodes() {
        files::write_json(&node.static_nodes_file(), &list)?;
    }
    tracing::info!(target: "discovery", peers = list.len(), nodes = net.nodes().count(), "propagated peer list");
    Ok(rewritten)
}

/// Generates and persists a node key for every non-validator node. Returns each node's peer
/// identifier, as seen from inside the network, in node order.
pub fn generate_node_keys(
    net: &Network,
    keys: &dyn NodeKeyTool,
    containerized: bool,
) -> Result<Vec<(String, Enode)>> {
    net.nodes()
        .filter(|node| !node.kind.is_validator())
        .map(|node| {
            let nodekey = node.nodekey_file();
            keys.generate(&nodekey)?;
            let public_key = keys.public_key(&nodekey)?;
            let (ip, port) = node
                .p2p_endpoint(containerized)
                .ok_or_else(|| Error::MissingContainerEndpoint(node.name.clone()))?;
            let enode = Enode::new(&public_key, ip, port, Some("discport=0".to_string()))?;
            tracing::debug!(target: "discovery", node = %node.name, %enode, "generated node key");
            Ok((node.name.clone(), enode))
        })
        .collect()
}
