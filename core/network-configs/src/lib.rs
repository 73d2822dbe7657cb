//! Configuration of a permissioned consortium network: the declarative topology, the
//! toolchain settings used to drive external tools, and the shared artifacts (genesis
//! document, peer identifiers, addresses) that every node must agree on.

mod config;
mod contract;
mod enode;
mod fields;
mod genesis;
pub mod test_utils;
mod topology;
mod types;

pub use config::{ToolchainConfig, ISTANBUL_BLOCK_PERIOD};
pub use contract::{ArgSpec, Contract, MAIN_ACCOUNT};
pub use enode::{Enode, EnodeError};
pub use genesis::{AllocEntry, GenesisDoc, GenesisError};
pub use topology::{
    AccountDecl, ContainerEndpoint, ContainerSettings, Network, Node, NodeKind, TopologyError,
};
pub use types::{parse_balance, Address, AddressError, Balance, U256};
