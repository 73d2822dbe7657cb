//! Typed view of the declarative network description.
//!
//! Everything that can be checked without touching the filesystem or spawning a process is
//! checked here, so that a bad description fails before any side effect.
use crate::config::ToolchainConfig;
use crate::contract::{Contract, MAIN_ACCOUNT};
use crate::fields::Fields;
use crate::types::{parse_balance, Address};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum TopologyError {
    #[error("{entity} is missing required field `{field}`")]
    MissingRequiredField { entity: String, field: String },
    #[error("{entity} has an invalid `{field}`: {reason}")]
    InvalidField { entity: String, field: String, reason: String },
    #[error("network declares no organizations")]
    NoOrganizations,
    #[error("network declares no validators")]
    NoValidators,
    #[error("node '{node}' belongs to organization '{org}' which the network does not declare")]
    UnknownOrganization { node: String, org: String },
    #[error("name '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("contract '{contract}' references unknown contract '{reference}'")]
    UnknownContract { contract: String, reference: String },
    #[error("constructor arguments of contracts {0:?} depend on each other; use `setup` to wire them")]
    ConstructorCycle(Vec<String>),
    #[error("node '{node}' has no container address (`docker-ip`)")]
    MissingContainerEndpoint { node: String },
    #[error("could not read network description {}", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("network description is not valid YAML")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Validator,
    Observer,
    Governor,
    Maintainer,
    Banker,
}

impl NodeKind {
    /// Declaration and iteration order.
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Validator,
        NodeKind::Observer,
        NodeKind::Governor,
        NodeKind::Maintainer,
        NodeKind::Banker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Validator => "validator",
            NodeKind::Observer => "observer",
            NodeKind::Governor => "governor",
            NodeKind::Maintainer => "maintainer",
            NodeKind::Banker => "banker",
        }
    }

    /// Key of the node list in the description, also the directory grouping nodes of a kind.
    pub fn plural(self) -> &'static str {
        match self {
            NodeKind::Validator => "validators",
            NodeKind::Observer => "observers",
            NodeKind::Governor => "governors",
            NodeKind::Maintainer => "maintainers",
            NodeKind::Banker => "bankers",
        }
    }

    pub fn from_plural(s: &str) -> Option<NodeKind> {
        NodeKind::ALL.into_iter().find(|kind| kind.plural() == s)
    }

    pub fn is_validator(self) -> bool {
        self == NodeKind::Validator
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `docker-settings` of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    pub network_driver: String,
    pub subnet: String,
    /// P2P port inside every container.
    pub geth_port: u16,
    /// RPC port inside every container.
    pub rpc_port: u16,
    /// Mount point of the node directory inside the container.
    pub workdir: String,
}

/// A node's identity on the container network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerEndpoint {
    pub ip: IpAddr,
    pub port: u16,
    pub rpc_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDecl {
    pub name: String,
    pub passphrase: String,
    /// Decimal digits; the width is checked when composing genesis.
    pub balance: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub org: String,
    pub ip: IpAddr,
    pub port: u16,
    pub rpc_port: u16,
    pub container: Option<ContainerEndpoint>,
    pub accounts: Vec<AccountDecl>,
    /// Only bankers declare one.
    pub token_supply: Option<String>,
    pub dir: PathBuf,
}

impl Node {
    fn from_yaml(
        name: String,
        kind: NodeKind,
        body: &serde_yaml::Value,
        net_dir: &Path,
        settings: &ContainerSettings,
    ) -> Result<Self, TopologyError> {
        let fields = Fields::new(format!("{kind} '{name}'"), body)?;
        let org = fields.required_str("org")?;
        let ip = fields.required_ip("ip")?;
        let port = fields.required_parsed("port")?;
        let rpc_port = fields.required_parsed("rpc-port")?;
        let container = match fields.optional_ip("docker-ip")? {
            Some(ip) => Some(ContainerEndpoint {
                ip,
                port: fields.optional_parsed("docker-port")?.unwrap_or(settings.geth_port),
                rpc_port: fields.optional_parsed("docker-rpc-port")?.unwrap_or(settings.rpc_port),
            }),
            None => None,
        };

        let account_items = if kind.is_validator() {
            fields.optional_list("accounts")?.unwrap_or(&[])
        } else {
            fields.required_list("accounts")?
        };
        let mut accounts = Vec::new();
        let mut seen = HashSet::new();
        for (account, body) in fields.named_entries("accounts", account_items)? {
            if !seen.insert(account.clone()) {
                return Err(fields.invalid("accounts", format!("account '{account}' declared twice")));
            }
            accounts.push(parse_account(&name, account, body)?);
        }

        let token_supply = if kind == NodeKind::Banker {
            let supply = fields.optional_str("token-supply")?;
            if let Some(supply) = &supply {
                if parse_balance(supply).is_none() {
                    return Err(fields.invalid("token-supply", format!("{supply:?} is not a uint256")));
                }
            }
            supply
        } else {
            None
        };

        let dir = net_dir.join(&org).join(kind.plural()).join(&name);
        Ok(Node { name, kind, org, ip, port, rpc_port, container, accounts, token_supply, dir })
    }

    pub fn account(&self, name: &str) -> Option<&AccountDecl> {
        self.accounts.iter().find(|account| account.name == name)
    }

    pub fn has_main_account(&self) -> bool {
        self.account(MAIN_ACCOUNT).is_some()
    }

    /// Endpoint other nodes dial, as seen from inside the network.
    pub fn p2p_endpoint(&self, containerized: bool) -> Option<(IpAddr, u16)> {
        if containerized {
            self.container.map(|c| (c.ip, c.port))
        } else {
            Some((self.ip, self.port))
        }
    }

    /// JSON-RPC endpoint reachable from the host.
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.rpc_port)
    }

    pub fn genesis_file(&self) -> PathBuf {
        self.dir.join("genesis.json")
    }

    /// Private state of the node binary.
    pub fn data_dir(&self) -> PathBuf {
        self.dir.join("data")
    }

    pub fn geth_dir(&self) -> PathBuf {
        self.data_dir().join("geth")
    }

    pub fn nodekey_file(&self) -> PathBuf {
        self.geth_dir().join("nodekey")
    }

    pub fn static_nodes_file(&self) -> PathBuf {
        self.data_dir().join("static-nodes.json")
    }

    pub fn address_file(&self, account: &str) -> PathBuf {
        self.dir.join(format!("{account}.address"))
    }

    pub fn info_file(&self) -> PathBuf {
        self.dir.join("info.json")
    }

    pub fn liveness_file(&self) -> PathBuf {
        self.dir.join("liveness.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("node.log")
    }

    pub fn contract_descriptor(&self, contract: &Contract) -> PathBuf {
        self.dir.join(contract.descriptor_file_name())
    }

    /// Files that must be in place before the node can be initialized.
    pub fn setup_files(&self) -> Vec<PathBuf> {
        vec![self.genesis_file(), self.static_nodes_file(), self.nodekey_file()]
    }

    /// Files the node binary leaves behind once initialized from genesis.
    pub fn init_markers(&self) -> Vec<PathBuf> {
        let chaindata = self.geth_dir().join("chaindata");
        ["CURRENT", "LOCK", "LOG"].iter().map(|file| chaindata.join(file)).collect()
    }
}

fn parse_account(
    node: &str,
    name: String,
    body: &serde_yaml::Value,
) -> Result<AccountDecl, TopologyError> {
    let fields = Fields::new(format!("account '{name}' of node '{node}'"), body)?;
    let passphrase = fields.required_str("passphrase")?;
    let balance = fields.optional_str("balance")?;
    if let Some(balance) = &balance {
        if balance.is_empty() || !balance.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fields.invalid("balance", format!("{balance:?} is not a decimal integer")));
        }
    }
    Ok(AccountDecl { name, passphrase, balance })
}

#[derive(Debug, Clone)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub orgs: Vec<String>,
    pub container: ContainerSettings,
    /// Declaration order is the positional key into the BFT setup output.
    pub validators: Vec<Node>,
    pub observers: Vec<Node>,
    pub governors: Vec<Node>,
    pub maintainers: Vec<Node>,
    pub bankers: Vec<Node>,
    /// Declaration order.
    pub contracts: Vec<Contract>,
    pub toolchain: ToolchainConfig,
    pub dir: PathBuf,
    node_index: HashMap<String, (NodeKind, usize)>,
    contract_index: HashMap<String, usize>,
}

impl Network {
    /// Reads and validates the description at `path`. Relative paths inside it are resolved
    /// against `workdir`, which also hosts the network directory.
    pub fn from_file(path: &Path, workdir: &Path) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| TopologyError::Read(path.to_path_buf(), err))?;
        Self::from_yaml_str(&text, workdir)
    }

    pub fn from_yaml_str(text: &str, workdir: &Path) -> Result<Self, TopologyError> {
        let document: serde_yaml::Value = serde_yaml::from_str(text)?;
        let root = Fields::new("network description", &document)?;
        let network = Self::from_yaml(root.required("network")?, workdir)?;
        let mut network = match root.get("toolchain") {
            Some(value) => Network { toolchain: serde_yaml::from_value(value.clone())?, ..network },
            None => network,
        };
        network.toolchain.resolve(workdir);
        tracing::debug!(
            target: "config",
            name = %network.name,
            nodes = network.nodes().count(),
            contracts = network.contracts.len(),
            "parsed network description"
        );
        Ok(network)
    }

    fn from_yaml(value: &serde_yaml::Value, workdir: &Path) -> Result<Self, TopologyError> {
        let fields = Fields::new("network", value)?;
        let chain_id = fields.required_parsed("id")?;
        let name = fields.required_str("name")?;
        let orgs = fields.required_str_list("orgs")?;
        let dir = workdir.join(&name);

        let settings_fields = Fields::new("docker-settings", fields.required("docker-settings")?)?;
        let container = ContainerSettings {
            network_driver: settings_fields.required_str("network-driver")?,
            subnet: settings_fields.required_str("subnet")?,
            geth_port: settings_fields.required_parsed("geth-port")?,
            rpc_port: settings_fields.required_parsed("rpc-port")?,
            workdir: settings_fields.required_str("workdir")?,
        };

        let mut lists: HashMap<NodeKind, Vec<Node>> = HashMap::new();
        for kind in NodeKind::ALL {
            let items = if kind.is_validator() {
                fields.required_list(kind.plural())?
            } else {
                fields.optional_list(kind.plural())?.unwrap_or(&[])
            };
            let nodes = fields
                .named_entries(kind.plural(), items)?
                .into_iter()
                .map(|(name, body)| Node::from_yaml(name, kind, body, &dir, &container))
                .collect::<Result<Vec<_>, _>>()?;
            lists.insert(kind, nodes);
        }

        let contracts = match fields.optional_list("contracts")? {
            Some(items) => fields
                .named_entries("contracts", items)?
                .into_iter()
                .map(|(name, body)| Contract::from_yaml(name, body, &dir, workdir))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut take = |kind: NodeKind| lists.remove(&kind).unwrap_or_default();
        let mut network = Network {
            chain_id,
            name,
            orgs,
            container,
            validators: take(NodeKind::Validator),
            observers: take(NodeKind::Observer),
            governors: take(NodeKind::Governor),
            maintainers: take(NodeKind::Maintainer),
            bankers: take(NodeKind::Banker),
            contracts,
            toolchain: ToolchainConfig::default(),
            dir,
            node_index: HashMap::new(),
            contract_index: HashMap::new(),
        };
        network.build_index()?;
        network.validate()?;
        Ok(network)
    }

    fn build_index(&mut self) -> Result<(), TopologyError> {
        let mut node_index = HashMap::new();
        for kind in NodeKind::ALL {
            for (i, node) in self.nodes_of(kind).iter().enumerate() {
                if node_index.insert(node.name.clone(), (kind, i)).is_some() {
                    return Err(TopologyError::DuplicateName(node.name.clone()));
                }
            }
        }
        let mut contract_index = HashMap::new();
        for (i, contract) in self.contracts.iter().enumerate() {
            if contract_index.insert(contract.name.clone(), i).is_some() {
                return Err(TopologyError::DuplicateName(contract.name.clone()));
            }
        }
        self.node_index = node_index;
        self.contract_index = contract_index;
        Ok(())
    }

    fn validate(&self) -> Result<(), TopologyError> {
        if self.orgs.is_empty() {
            return Err(TopologyError::NoOrganizations);
        }
        if self.validators.is_empty() {
            return Err(TopologyError::NoValidators);
        }
        for node in self.nodes() {
            if !self.orgs.contains(&node.org) {
                return Err(TopologyError::UnknownOrganization {
                    node: node.name.clone(),
                    org: node.org.clone(),
                });
            }
        }
        for contract in &self.contracts {
            for reference in contract.dependencies() {
                if !self.contract_index.contains_key(reference) {
                    return Err(TopologyError::UnknownContract {
                        contract: contract.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
            for kind in contract.referenced_roles() {
                if let Some(node) = self.nodes_of(kind).iter().find(|n| !n.has_main_account()) {
                    return Err(TopologyError::InvalidField {
                        entity: format!("contract '{}'", contract.name),
                        field: "constructor-args".to_string(),
                        reason: format!(
                            "{} '{}' has no `{MAIN_ACCOUNT}` account to stand for it",
                            kind, node.name
                        ),
                    });
                }
            }
        }
        self.check_constructor_cycles()
    }

    /// Constructor dependencies must form a DAG; `setup` edges may form cycles.
    fn check_constructor_cycles(&self) -> Result<(), TopologyError> {
        let mut remaining: BTreeSet<&str> =
            self.contracts.iter().map(|c| c.name.as_str()).collect();
        loop {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|name| {
                    self.contract(name).map_or(true, |c| {
                        c.constructor_dependencies().all(|dep| !remaining.contains(dep))
                    })
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in ready {
                remaining.remove(name);
            }
        }
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(TopologyError::ConstructorCycle(remaining.into_iter().map(String::from).collect()))
        }
    }

    /// Fails if any node lacks the container identity needed to run it in a container.
    pub fn check_container_endpoints(&self) -> Result<(), TopologyError> {
        match self.nodes().find(|node| node.container.is_none()) {
            Some(node) => Err(TopologyError::MissingContainerEndpoint { node: node.name.clone() }),
            None => Ok(()),
        }
    }

    pub fn nodes_of(&self, kind: NodeKind) -> &[Node] {
        match kind {
            NodeKind::Validator => &self.validators,
            NodeKind::Observer => &self.observers,
            NodeKind::Governor => &self.governors,
            NodeKind::Maintainer => &self.maintainers,
            NodeKind::Banker => &self.bankers,
        }
    }

    /// All nodes, validators first, then each auxiliary role in turn.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        NodeKind::ALL.into_iter().flat_map(move |kind| self.nodes_of(kind).iter())
    }

    pub fn non_validators(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|node| !node.kind.is_validator())
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.node_index.get(name).map(|&(kind, i)| &self.nodes_of(kind)[i])
    }

    pub fn contract(&self, name: &str) -> Option<&Contract> {
        self.contract_index.get(name).map(|&i| &self.contracts[i])
    }

    /// The validator in whose directory the BFT setup utility runs.
    pub fn leader(&self) -> &Node {
        &self.validators[0]
    }

    /// The first maintainer that declares a `main` account.
    pub fn deployer(&self) -> Option<&Node> {
        self.maintainers.iter().find(|node| node.has_main_account())
    }

    pub fn contracts_dir(&self) -> PathBuf {
        self.dir.join("contracts")
    }

    /// Aggregate `{node: {account: address}}` map.
    pub fn addresses_file(&self) -> PathBuf {
        self.dir.join("addresses.json")
    }

    /// Accounts declaring a pre-allocated balance, in node order.
    pub fn funded_accounts(&self) -> impl Iterator<Item = (&Node, &AccountDecl)> {
        self.nodes().flat_map(|node| {
            node.accounts.iter().filter(|a| a.balance.is_some()).map(move |a| (node, a))
        })
    }

    /// Contracts seeded into genesis rather than deployed.
    pub fn genesis_contracts(&self) -> impl Iterator<Item = (&Contract, Address)> {
        self.contracts.iter().filter_map(|c| c.genesis_address.map(|addr| (c, addr)))
    }
}
