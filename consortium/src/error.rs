use consortium_jsonrpc_client::RpcError;
use consortium_network_configs::{EnodeError, GenesisError, TopologyError};
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("network directory {} already exists; use `init --reset` to rebuild it", .0.display())]
    NetworkAlreadyExists(PathBuf),
    #[error("network directory {} does not exist; run `init` first", .0.display())]
    NetworkDirMissing(PathBuf),
    #[error("could not create the directory of node '{node}'")]
    NodeDirCreation {
        node: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {reason}")]
    DelegateFailed { command: String, reason: String },
    #[error("`{command}` did not finish within {timeout:?}")]
    DelegateTimeout { command: String, timeout: Duration },
    #[error("unexpected output from `{command}`: {reason}")]
    MalformedDelegateOutput { command: String, reason: String },
    #[error("BFT setup produced {found} {what} for {expected} validators")]
    KeySetMismatch { what: &'static str, expected: usize, found: usize },
    #[error("no address in the account creation output for account '{account}' of node '{node}'")]
    AccountCreation { node: String, account: String },
    #[error("account '{account}' of node '{node}' has no provisioned address")]
    AccountNotProvisioned { node: String, account: String },
    #[error("{0}")]
    FatalConfig(String),
    #[error("node '{node}' is missing setup files {missing:?}")]
    NodeNotSetup { node: String, missing: Vec<PathBuf> },
    #[error("node '{0}' is already initialized")]
    AlreadyInitialized(String),
    #[error("node '{0}' is not initialized")]
    NodeNotInitialized(String),
    #[error("node '{0}' is already running; shut it down first")]
    NodeAlreadyRunning(String),
    #[error("could not signal process {pid}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("process {0} is still alive after SIGKILL")]
    ProcessSurvived(u32),
    #[error("node '{0}' has no container address (`docker-ip`)")]
    MissingContainerEndpoint(String),
    #[error("no maintainer declares a `main` account to deploy contracts from")]
    NoDeployer,
    #[error("could not compile contract '{contract}': {reason}")]
    ContractCompilation { contract: String, reason: String },
    #[error("artifact {} is missing; is the contract compiled?", .0.display())]
    ArtifactMissing(PathBuf),
    #[error("contract '{contract}' needs the address of '{dependency}', which is not deployed")]
    DependencyNotDeployed { contract: String, dependency: String },
    #[error("transaction {tx} of contract '{contract}' failed")]
    TransactionFailed { contract: String, tx: String },
    #[error("transaction {tx} of contract '{contract}' was not confirmed within {timeout:?}")]
    ConfirmationTimeout { contract: String, tx: String, timeout: Duration },
    #[error("cancelled")]
    Cancelled,
    #[error("JSON-RPC call failed")]
    Rpc(#[from] RpcError),
    #[error("ABI of contract '{contract}' cannot encode the call")]
    Abi {
        contract: String,
        #[source]
        source: ethabi::Error,
    },
    #[error(transparent)]
    Genesis(#[from] GenesisError),
    #[error(transparent)]
    Enode(#[from] EnodeError),
    #[error("I/O error on {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("malformed JSON in {}", .0.display())]
    Json(PathBuf, #[source] serde_json::Error),
}
