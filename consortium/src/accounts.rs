//! Signing accounts, created by the node binary.
use crate::delegates::NodeBinary;
use crate::error::{Error, Result};
use crate::files;
use consortium_network_configs::{AccountDecl, Address, Network, Node};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provisioned addresses, `{node: {account: address}}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AddressBook(BTreeMap<String, BTreeMap<String, Address>>);

impl AddressBook {
    pub fn load(net: &Network) -> Result<Self> {
        Ok(files::read_json_opt(&net.addresses_file())?.unwrap_or_default())
    }

    pub fn save(&self, net: &Network) -> Result<()> {
        files::write_json(&net.addresses_file(), self)
    }

    pub fn insert(&mut self, node: &str, account: &str, address: Address) {
        self.0.entry(node.to_string()).or_default().insert(account.to_string(), address);
    }

    pub fn get(&self, node: &str, account: &str) -> Option<Address> {
        self.0.get(node).and_then(|accounts| accounts.get(account)).copied()
    }

    /// Like [`Self::get`], failing with [`Error::AccountNotProvisioned`].
    pub fn require(&self, node: &str, account: &str) -> Result<Address> {
        self.get(node, account).ok_or_else(|| Error::AccountNotProvisioned {
            node: node.to_string(),
            account: account.to_string(),
        })
    }

    pub fn accounts_of(&self, node: &str) -> BTreeMap<String, Address> {
        self.0.get(node).cloned().unwrap_or_default()
    }
}

/// Finds the address token in the unstructured output of account creation.
///
/// Accepts `0x`-prefixed tokens as well as the bare `{hex}` form older binaries print.
pub fn parse_address(output: &str) -> Option<Address> {
    output
        .split(|c: char| c.is_whitespace() || matches!(c, '{' | '}' | ',' | '"'))
        .filter(|token| Address::is_address_token(token))
        .find_map(|token| token.parse().ok())
}

/// Creates `account` on `node` and records the address in `<node>/<account>.address`.
pub fn provision_account(
    node: &Node,
    account: &AccountDecl,
    binary: &dyn NodeBinary,
) -> Result<Address> {
    let output = binary.new_account(&node.dir, &account.passphrase)?;
    let address = parse_address(&output).ok_or_else(|| {
        tracing::error!(target: "bootstrap", node = %node.name, account = %account.name, %output, "no address in output");
        Error::AccountCreation { node: node.name.clone(), account: account.name.clone() }
    })?;
    files::write(&node.address_file(&account.name), address.to_string())?;
    tracing::info!(target: "bootstrap", node = %node.name, account = %account.name, %address, "created account");
    Ok(address)
}

/// Provisions every declared account and persists the aggregate address map.
pub fn provision_accounts(net: &Network, binary: &dyn NodeBinary) -> Result<AddressBook> {
    let mut book = AddressBook::default();
    for node in net.nodes() {
        for account in &node.accounts {
            let address = provision_account(node, account, binary)?;
            book.insert(&node.name, &account.name, address);
        }
    }
    book.save(net)?;
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_geth_output() {
        let output = "Your new key was generated\n\n\
            Public address of the key:   0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed\n\
            Path of the secret key file: data/keystore/UTC--2020-01-01T00-00-00.000Z--5aaeb6053f3e94c9b9a09f33669435e7ef1beaed\n";
        assert_eq!(
            parse_address(output).unwrap().to_string(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn address_in_braces() {
        let output = "Address: {fb6916095ca1df60bb79ce92ce3ea74c37c5d359}\n";
        assert_eq!(
            parse_address(output).unwrap().to_string(),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
    }

    #[test]
    fn no_address() {
        assert_eq!(parse_address("Fatal: Passphrases do not match"), None);
        assert_eq!(parse_address("0x1234 deadbeef"), None);
    }
}
