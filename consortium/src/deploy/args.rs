//! Constructor arguments, resolved against the network and the contracts deployed so far.
use crate::accounts::AddressBook;
use crate::error::{Error, Result};
use consortium_network_configs::{Address, ArgSpec, Contract, Network, Node, NodeKind, MAIN_ACCOUNT};
use ethabi::Token;
use std::collections::BTreeMap;

pub(crate) fn address_token(address: Address) -> Token {
    Token::Address(ethabi::Address::from(address.0))
}

fn uint_token(contract: &Contract, digits: &str) -> Result<Token> {
    ethabi::Uint::from_dec_str(digits).map(Token::Uint).map_err(|_| {
        Error::FatalConfig(format!("argument {digits:?} of contract '{}' is not a uint256", contract.name))
    })
}

fn main_addresses<'a>(
    book: &AddressBook,
    nodes: impl Iterator<Item = &'a Node>,
) -> Result<Vec<Token>> {
    nodes.map(|node| Ok(address_token(book.require(&node.name, MAIN_ACCOUNT)?))).collect()
}

fn token_holders(net: &Network, kind: NodeKind) -> impl Iterator<Item = &Node> {
    net.nodes_of(kind).iter().filter(|node| node.token_supply.is_some())
}

/// Resolves every constructor argument of `contract`.
///
/// A `contract:` argument whose contract has no persisted address is
/// [`Error::DependencyNotDeployed`].
pub fn constructor_tokens(
    net: &Network,
    contract: &Contract,
    deployed: &BTreeMap<String, Address>,
    book: &AddressBook,
) -> Result<Vec<Token>> {
    contract
        .constructor_args
        .iter()
        .map(|arg| {
            Ok(match arg {
                ArgSpec::Contract(name) => {
                    let address = deployed.get(name).ok_or_else(|| Error::DependencyNotDeployed {
                        contract: contract.name.clone(),
                        dependency: name.clone(),
                    })?;
                    address_token(*address)
                }
                ArgSpec::RoleAccounts(kind) => {
                    Token::Array(main_addresses(book, net.nodes_of(*kind).iter())?)
                }
                ArgSpec::TokenHolders(kind) => {
                    Token::Array(main_addresses(book, token_holders(net, *kind))?)
                }
                ArgSpec::TokenSupplies(kind) => Token::Array(
                    token_holders(net, *kind)
                        .filter_map(|node| node.token_supply.as_deref())
                        .map(|supply| uint_token(contract, supply))
                        .collect::<Result<_>>()?,
                ),
                ArgSpec::Address(address) => address_token(*address),
                ArgSpec::Addresses(addresses) => {
                    Token::Array(addresses.iter().copied().map(address_token).collect())
                }
                ArgSpec::Uint(digits) => uint_token(contract, digits)?,
            })
        })
        .collect()
}
