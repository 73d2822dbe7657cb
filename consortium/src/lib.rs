//! Bootstrap engine for a permissioned consortium network.
//!
//! Reconciles a declarative [`Network`] into per-node artifacts (shared genesis, validator key
//! material, peer lists, signing accounts), drives every node through its lifecycle and deploys
//! the governance contracts once the chain runs.

use consortium_network_configs::Network;

pub mod accounts;
pub mod bootstrap;
pub mod delegates;
pub mod deploy;
pub mod discovery;
mod error;
mod files;
pub mod genesis;
pub mod lifecycle;
pub mod provision;
pub mod state;
pub mod test_utils;
pub mod validators;

pub use delegates::Delegates;
pub use error::{Error, Result};

/// How nodes are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One container per node on a dedicated container network.
    Container,
    /// Locally supervised processes.
    Process,
}

impl Mode {
    pub fn is_container(self) -> bool {
        self == Mode::Container
    }
}

/// Everything an operation needs: the network, the tools, and how nodes run.
pub struct Context {
    pub network: Network,
    pub delegates: Delegates,
    pub mode: Mode,
}

impl Context {
    pub fn new(network: Network, delegates: Delegates, mode: Mode) -> Self {
        Context { network, delegates, mode }
    }
}
