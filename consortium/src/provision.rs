//! Directory hierarchy of a network.
//!
//! `<net>/<org>/<role>s/<node>/data/geth` per node and `<net>/contracts/<name>/bin` per
//! contract. Creation is all-or-nothing only through the explicit reset path.
use crate::error::{Error, Result};
use consortium_network_configs::Network;
use std::io::ErrorKind;

/// Creates the network root and every node and contract directory.
///
/// Fails with [`Error::NetworkAlreadyExists`] if the root exists, unless `reset` is set, in which
/// case the root is deleted first.
pub fn create_hierarchy(net: &Network, reset: bool) -> Result<()> {
    if reset && net.dir.exists() {
        tracing::info!(target: "bootstrap", dir = %net.dir.display(), "resetting network directory");
        std::fs::remove_dir_all(&net.dir).map_err(|err| Error::Io(net.dir.clone(), err))?;
    }
    if let Some(parent) = net.dir.parent() {
        std::fs::create_dir_all(parent).map_err(|err| Error::Io(parent.to_path_buf(), err))?;
    }
    match std::fs::create_dir(&net.dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::NetworkAlreadyExists(net.dir.clone()))
        }
        Err(err) => return Err(Error::Io(net.dir.clone(), err)),
    }

    for node in net.nodes() {
        std::fs::create_dir_all(node.geth_dir())
            .map_err(|source| Error::NodeDirCreation { node: node.name.clone(), source })?;
    }
    for contract in &net.contracts {
        let bin_dir = contract.bin_dir();
        std::fs::create_dir_all(&bin_dir).map_err(|err| Error::Io(bin_dir, err))?;
    }
    tracing::debug!(target: "bootstrap", dir = %net.dir.display(), "created directory hierarchy");
    Ok(())
}

/// Fails with [`Error::NetworkDirMissing`] unless the network has been provisioned.
pub fn ensure_exists(net: &Network) -> Result<()> {
    if net.dir.is_dir() {
        Ok(())
    } else {
        Err(Error::NetworkDirMissing(net.dir.clone()))
    }
}

/// Deletes the network directory. A missing directory is an error unless `tolerate_missing`.
pub fn remove_network_dir(net: &Network, tolerate_missing: bool) -> Result<()> {
    match std::fs::remove_dir_all(&net.dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if tolerate_missing {
                Ok(())
            } else {
                Err(Error::NetworkDirMissing(net.dir.clone()))
            }
        }
        Err(err) => Err(Error::Io(net.dir.clone(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use consortium_network_configs::test_utils::network_yaml;

    #[test]
    fn create_then_refuse_then_reset() {
        let dir = tempfile::tempdir().unwrap();
        let net = Network::from_yaml_str(&network_yaml(2, "1"), dir.path()).unwrap();
        create_hierarchy(&net, false).unwrap();
        for node in net.nodes() {
            assert!(node.geth_dir().is_dir(), "{}", node.name);
        }
        std::fs::write(net.dir.join("stale"), "x").unwrap();

        assert_matches!(create_hierarchy(&net, false), Err(Error::NetworkAlreadyExists(_)));
        assert!(net.dir.join("stale").exists());

        create_hierarchy(&net, true).unwrap();
        assert!(!net.dir.join("stale").exists());
        assert!(net.leader().geth_dir().is_dir());
    }

    #[test]
    fn remove_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let net = Network::from_yaml_str(&network_yaml(1, "1"), dir.path()).unwrap();
        assert_matches!(ensure_exists(&net), Err(Error::NetworkDirMissing(_)));
        assert_matches!(remove_network_dir(&net, false), Err(Error::NetworkDirMissing(_)));
        remove_network_dir(&net, true).unwrap();
    }
}
