//! Joint key generation for the validator set.
//!
//! The BFT setup utility runs once in the leader's directory. Its outputs are matched to
//! validators by position: the `i`-th key set and the `i`-th peer identifier belong to the
//! `i`-th declared validator. Nothing downstream may reorder the validator list.
use crate::delegates::BftSetup;
use crate::error::{Error, Result};
use crate::files;
use consortium_network_configs::{Enode, GenesisDoc, Network};
use std::path::Path;

/// What the BFT setup utility produced, in validator declaration order.
#[derive(Debug, Clone)]
pub struct ValidatorBootstrap {
    /// Peer identifiers, still carrying the placeholder endpoint.
    pub enodes: Vec<Enode>,
    /// Genesis skeleton holding the validator-set encoding.
    pub genesis: GenesisDoc,
}

/// Runs the BFT setup utility for all validators and distributes the key material.
///
/// Any failure aborts; a single validator's keys cannot be regenerated on its own.
pub fn setup_validators(net: &Network, bft: &dyn BftSetup) -> Result<ValidatorBootstrap> {
    let leader = net.leader();
    let count = net.validators.len();
    tracing::info!(target: "bootstrap", leader = %leader.name, count, "generating validator key sets");
    bft.setup(&leader.dir, count)?;

    let peers_file = leader.dir.join("static-nodes.json");
    let raw: Vec<String> = files::read_json(&peers_file)?;
    if raw.len() != count {
        return Err(Error::KeySetMismatch { what: "peer identifiers", expected: count, found: raw.len() });
    }
    let enodes = raw.iter().map(|s| s.parse()).collect::<Result<Vec<Enode>, _>>()?;
    let found = (0..count).filter(|i| key_file(&leader.dir, *i).is_file()).count();
    if found != count {
        return Err(Error::KeySetMismatch { what: "key sets", expected: count, found });
    }
    let genesis = GenesisDoc::from_file(&leader.genesis_file())?;

    for (i, validator) in net.validators.iter().enumerate() {
        files::copy(&key_file(&leader.dir, i), &validator.nodekey_file())?;
        if validator.name != leader.name {
            files::copy(&leader.genesis_file(), &validator.genesis_file())?;
        }
        files::write_json(&validator.static_nodes_file(), &raw)?;
        tracing::debug!(target: "bootstrap", validator = %validator.name, index = i, "distributed key set");
    }
    for i in 0..count {
        let dir = leader.dir.join(i.to_string());
        std::fs::remove_dir_all(&dir).map_err(|err| Error::Io(dir, err))?;
    }
    files::remove_file_if_exists(&peers_file)?;
    Ok(ValidatorBootstrap { enodes, genesis })
}

fn key_file(dir: &Path, index: usize) -> std::path::PathBuf {
    dir.join(index.to_string()).join("nodekey")
}
