//! Composition and distribution of the shared genesis document.
//!
//! Every node must hold a byte-identical copy: the consensus layer rejects peers whose genesis
//! hash differs.
use crate::accounts::AddressBook;
use crate::delegates::ContractCompiler;
use crate::error::{Error, Result};
use crate::files;
use consortium_network_configs::{parse_balance, Address, GenesisDoc, Network};

/// A pre-allocated balance, keyed by the provisioned address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// `node/account`, for error messages.
    pub owner: String,
    pub address: Address,
    /// Decimal digits.
    pub balance: String,
}

/// Runtime bytecode seeded at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededContract {
    pub name: String,
    pub address: Address,
    pub code: String,
}

/// The allocations declared by the network, resolved through the address book.
pub fn allocations(net: &Network, book: &AddressBook) -> Result<Vec<Allocation>> {
    net.funded_accounts()
        .filter_map(|(node, account)| account.balance.as_ref().map(|b| (node, account, b)))
        .map(|(node, account, balance)| {
            Ok(Allocation {
                owner: format!("{}/{}", node.name, account.name),
                address: book.require(&node.name, &account.name)?,
                balance: balance.clone(),
            })
        })
        .collect()
}

/// Clears the skeleton's allocation map and fills it from `allocations` and `seeded`.
///
/// Balances wider than the chain's native integer are a [`Error::FatalConfig`].
pub fn compose_genesis(
    skeleton: &GenesisDoc,
    allocations: &[Allocation],
    seeded: &[SeededContract],
) -> Result<GenesisDoc> {
    let mut doc = skeleton.clone();
    doc.clear_alloc();
    for allocation in allocations {
        let balance = parse_balance(&allocation.balance).ok_or_else(|| {
            Error::FatalConfig(format!(
                "balance {} of account {} does not fit into 256 bits",
                allocation.balance, allocation.owner
            ))
        })?;
        doc.allocate(allocation.address, balance);
    }
    for contract in seeded {
        if doc.alloc.contains_key(&contract.address) {
            return Err(Error::FatalConfig(format!(
                "genesis address {} of contract {} is already allocated",
                contract.address, contract.name
            )));
        }
        doc.seed_contract(contract.address, &contract.code);
    }
    Ok(doc)
}

/// Compiles the contracts seeded into genesis and reads their runtime bytecode.
pub fn seeded_contracts(net: &Network, compiler: &dyn ContractCompiler) -> Result<Vec<SeededContract>> {
    net.genesis_contracts()
        .map(|(contract, address)| {
            compiler.compile(contract, true)?;
            let file = contract.runtime_bytecode_file();
            if !file.is_file() {
                return Err(Error::ArtifactMissing(file));
            }
            let code = files::read_to_string(&file)?.trim().to_string();
            tracing::info!(target: "genesis", contract = %contract.name, %address, "seeding contract");
            Ok(SeededContract { name: contract.name.clone(), address, code })
        })
        .collect()
}

/// Writes `doc` to the leader and fans the same bytes out to every other node.
pub fn publish_genesis(net: &Network, doc: &GenesisDoc) -> Result<()> {
    let bytes = doc.to_bytes()?;
    for node in net.nodes() {
        files::write(&node.genesis_file(), &bytes)?;
    }
    tracing::info!(
        target: "genesis",
        allocations = doc.alloc.len(),
        nodes = net.nodes().count(),
        "published genesis"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use consortium_network_configs::U256;

    fn skeleton() -> GenesisDoc {
        serde_json::from_value(serde_json::json!({
            "config": {"chainId": 10},
            "extraData": "0xf85ad594",
            "alloc": {"0x0000000000000000000000000000000000000001": {"balance": "0x1"}}
        }))
        .unwrap()
    }

    fn allocation(balance: &str) -> Allocation {
        Allocation {
            owner: "m0/main".into(),
            address: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap(),
            balance: balance.into(),
        }
    }

    #[test]
    fn composition_is_idempotent() {
        let allocations = [allocation("1000")];
        let first = compose_genesis(&skeleton(), &allocations, &[]).unwrap();
        let second = compose_genesis(&first, &allocations, &[]).unwrap();
        assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
        assert_eq!(first.alloc.len(), 1);
        assert_eq!(first.extra_data, "0xf85ad594");
    }

    #[test]
    fn overflow_is_fatal() {
        let too_wide = format!("{}0", U256::MAX);
        assert_matches!(
            compose_genesis(&skeleton(), &[allocation(&too_wide)], &[]),
            Err(Error::FatalConfig(msg)) if msg.contains("m0/main")
        );
        let max = U256::MAX.to_string();
        let doc = compose_genesis(&skeleton(), &[allocation(&max)], &[]).unwrap();
        assert_eq!(doc.alloc.values().next().unwrap().balance, max);
    }

    #[test]
    fn seeded_address_collision() {
        let seeded = SeededContract {
            name: "Governing".into(),
            address: allocation("1").address,
            code: "00".into(),
        };
        assert_matches!(
            compose_genesis(&skeleton(), &[allocation("1")], &[seeded]),
            Err(Error::FatalConfig(_))
        );
    }
}
