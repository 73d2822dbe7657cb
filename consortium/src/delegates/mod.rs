//! Seams to the external tools the bootstrap engine drives.
//!
//! Every tool sits behind a trait so that the pipeline can run against in-process fakes. The
//! real implementations shell out through [`run_delegate`], which enforces a timeout.
use crate::error::{Error, Result};
use consortium_network_configs::{Contract, ToolchainConfig};
use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

mod bootnode;
mod docker;
mod geth;
mod istanbul;
mod solc;

pub use bootnode::Bootnode;
pub use docker::Docker;
pub(crate) use docker::current_uid;
pub use geth::Geth;
pub use istanbul::Istanbul;
pub use solc::Solc;

/// Generates key material for all validators in one joint call.
pub trait BftSetup: Send + Sync {
    /// Runs in `dir` and leaves `<dir>/<i>/nodekey` for every `i < count`, plus one shared
    /// `<dir>/static-nodes.json` and `<dir>/genesis.json`.
    fn setup(&self, dir: &Path, count: usize) -> Result<()>;
}

/// Node key utilities for nodes that take no part in the joint validator setup.
pub trait NodeKeyTool: Send + Sync {
    /// Writes a fresh private node key to `nodekey`.
    fn generate(&self, nodekey: &Path) -> Result<()>;
    /// Hex public key (the node id of its peer identifier) of the key in `nodekey`.
    fn public_key(&self, nodekey: &Path) -> Result<String>;
}

/// Parameters a node is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub chain_id: u64,
    pub p2p_port: u16,
    pub rpc_port: u16,
    /// Validators produce blocks.
    pub validator: bool,
    pub block_period: u64,
}

/// The consensus/execution node binary.
pub trait NodeBinary: Send + Sync {
    /// Creates an account in `node_dir`, returning the binary's unstructured output.
    fn new_account(&self, node_dir: &Path, passphrase: &str) -> Result<String>;
    /// Initializes the node's private state from `node_dir/genesis.json`.
    fn init(&self, node_dir: &Path) -> Result<()>;
    /// Program started as a local supervised process.
    fn program(&self) -> &Path;
    /// Arguments the node runs with, relative to its own directory.
    fn run_args(&self, options: &RunOptions) -> Vec<String>;
}

/// What to run in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub ip: IpAddr,
    /// Host directory mounted at `workdir`.
    pub host_dir: PathBuf,
    pub workdir: String,
    /// `(host, container)` port pairs.
    pub ports: Vec<(u16, u16)>,
    pub command: Vec<String>,
}

/// A container runtime used purely as a process sandbox.
pub trait ContainerRuntime: Send + Sync {
    fn create_network(&self, name: &str, driver: &str, subnet: &str) -> Result<()>;
    fn remove_network(&self, name: &str) -> Result<()>;
    fn build_image(&self, tag: &str, context: &Path, build_args: &[(String, String)]) -> Result<()>;
    fn remove_image(&self, tag: &str) -> Result<()>;
    /// Starts a detached container and returns its (short) identifier.
    fn run(&self, spec: &ContainerSpec) -> Result<String>;
    fn stop(&self, id: &str) -> Result<()>;
    fn is_alive(&self, id: &str) -> Result<bool>;
}

pub trait ContractCompiler: Send + Sync {
    /// Writes the contract's bytecode into its `bin` directory and its ABI next to it.
    /// With `runtime`, the bytecode is the deployed (runtime) code rather than creation code.
    fn compile(&self, contract: &Contract, runtime: bool) -> Result<()>;
}

/// The set of external collaborators.
pub struct Delegates {
    pub bft: Box<dyn BftSetup>,
    pub keys: Box<dyn NodeKeyTool>,
    pub node: Box<dyn NodeBinary>,
    pub containers: Box<dyn ContainerRuntime>,
    pub compiler: Box<dyn ContractCompiler>,
}

impl Delegates {
    /// The real tools, located as configured.
    pub fn from_config(config: &ToolchainConfig) -> Self {
        let limits = Limits { timeout: config.delegate_timeout(), poll: config.poll_interval() };
        Delegates {
            bft: Box::new(Istanbul::new(config.istanbul.clone(), limits)),
            keys: Box::new(Bootnode::new(config.bootnode.clone(), limits)),
            node: Box::new(Geth::new(config.geth.clone(), limits)),
            containers: Box::new(Docker::new(config.docker.clone(), limits)),
            compiler: Box::new(Solc::new(config.solc.clone(), limits)),
        }
    }
}

/// How long a delegate may run and how often it is checked on.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub timeout: Duration,
    pub poll: Duration,
}

/// Runs `command` to completion, feeding it `stdin`, and returns its stdout.
///
/// The child is killed once `limits.timeout` expires. A non-zero exit is an error carrying the
/// captured stderr.
pub(crate) fn run_delegate(
    mut command: Command,
    stdin: Option<&str>,
    limits: Limits,
) -> Result<String> {
    let cmdline = describe(&command);
    tracing::debug!(target: "delegate", command = %cmdline, "running");
    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|err| {
        tracing::error!(target: "delegate", command = %cmdline, %err, "could not start");
        Error::DelegateFailed { command: cmdline.clone(), reason: err.to_string() }
    })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A delegate that exits without reading its input is judged by its exit status.
        if let Err(err) = pipe.write_all(input.as_bytes()) {
            tracing::debug!(target: "delegate", command = %cmdline, %err, "stdin closed early");
        }
    }

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() > limits.timeout => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::error!(target: "delegate", command = %cmdline, timeout = ?limits.timeout, "timed out");
                return Err(Error::DelegateTimeout { command: cmdline, timeout: limits.timeout });
            }
            Ok(None) => std::thread::sleep(limits.poll),
            Err(err) => {
                return Err(Error::DelegateFailed { command: cmdline, reason: err.to_string() })
            }
        }
    };

    let stdout = stdout.and_then(|handle| handle.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|handle| handle.join().ok()).unwrap_or_default();
    if !status.success() {
        tracing::error!(target: "delegate", command = %cmdline, %status, stderr = %stderr.trim(), "failed");
        return Err(Error::DelegateFailed {
            command: cmdline,
            reason: format!("{status}: {}", stderr.trim()),
        });
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
