//! Deployment order over constructor dependencies.
use crate::error::Result;
use consortium_network_configs::{Contract, Network, TopologyError};
use std::collections::{BTreeSet, HashMap};

/// Contracts ordered so that every contract comes after the contracts its constructor needs.
///
/// Among contracts whose dependencies are satisfied, declaration order wins. Setup edges are
/// not part of the graph: they are wired after every contract is deployed.
pub fn deployment_order(net: &Network) -> Result<Vec<&Contract>> {
    let index: HashMap<&str, usize> =
        net.contracts.iter().enumerate().map(|(i, c)| (c.name.as_str(), i)).collect();
    let mut pending = vec![0usize; net.contracts.len()];
    let mut dependents = vec![Vec::new(); net.contracts.len()];
    for (i, contract) in net.contracts.iter().enumerate() {
        for dependency in contract.constructor_dependencies() {
            if let Some(&j) = index.get(dependency) {
                pending[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(net.contracts.len());
    while let Some(i) = ready.pop_first() {
        order.push(&net.contracts[i]);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < net.contracts.len() {
        let stuck =
            net.contracts.iter().zip(&pending).filter(|(_, &n)| n > 0).map(|(c, _)| c.name.clone());
        return Err(TopologyError::ConstructorCycle(stuck.collect()).into());
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{contracts_yaml, network_with_contracts};

    fn names(order: Vec<&Contract>) -> Vec<&str> {
        order.into_iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn dependencies_first() {
        let dir = tempfile::tempdir().unwrap();
        let net = network_with_contracts(dir.path(), &contracts_yaml());
        let order = deployment_order(&net).unwrap();
        assert_eq!(names(order), ["Governing", "CBDC", "CCBDC"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "  contracts:
    - Token:
        path: contracts/Token.sol
        constructor-args:
          - contract: Root
    - Root:
        path: contracts/Root.sol
    - Registry:
        path: contracts/Registry.sol
";
        let net = network_with_contracts(dir.path(), yaml);
        assert_eq!(names(deployment_order(&net).unwrap()), ["Root", "Token", "Registry"]);
    }
}
