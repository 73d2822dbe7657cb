use crate::fields::Fields;
use crate::topology::{NodeKind, TopologyError};
use crate::types::{parse_balance, Address};
use std::path::{Path, PathBuf};

/// Account name whose address stands for a node in role lists and deploys contracts.
pub const MAIN_ACCOUNT: &str = "main";

/// One constructor argument, resolved against the network at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSpec {
    /// Deployed address of another contract.
    Contract(String),
    /// `main` addresses of every node of a role, as `address[]`.
    RoleAccounts(NodeKind),
    /// `main` addresses of the nodes of a role declaring a token supply, as `address[]`.
    TokenHolders(NodeKind),
    /// Token supplies of the same nodes, in the same order, as `uint256[]`.
    TokenSupplies(NodeKind),
    Address(Address),
    Addresses(Vec<Address>),
    /// Decimal `uint256`.
    Uint(String),
}

impl ArgSpec {
    fn parse(fields: &Fields<'_>, key: &str, value: &serde_yaml::Value) -> Result<Self, TopologyError> {
        let scalar = |value: &serde_yaml::Value| -> Result<String, TopologyError> {
            match value {
                serde_yaml::Value::String(s) => Ok(s.clone()),
                serde_yaml::Value::Number(n) => Ok(n.to_string()),
                _ => Err(fields.invalid("constructor-args", format!("`{key}` expects a scalar"))),
            }
        };
        let role = |value: &serde_yaml::Value| -> Result<NodeKind, TopologyError> {
            let raw = scalar(value)?;
            NodeKind::from_plural(&raw).ok_or_else(|| {
                fields.invalid("constructor-args", format!("unknown role {raw:?} for `{key}`"))
            })
        };
        let address = |raw: String| -> Result<Address, TopologyError> {
            raw.parse().map_err(|err| fields.invalid("constructor-args", format!("{err}")))
        };
        Ok(match key {
            "contract" => ArgSpec::Contract(scalar(value)?),
            "role-accounts" => ArgSpec::RoleAccounts(role(value)?),
            "token-holders" => ArgSpec::TokenHolders(role(value)?),
            "token-supplies" => ArgSpec::TokenSupplies(role(value)?),
            "address" => ArgSpec::Address(address(scalar(value)?)?),
            "addresses" => match value {
                serde_yaml::Value::Sequence(items) => ArgSpec::Addresses(
                    items.iter().map(|item| address(scalar(item)?)).collect::<Result<_, _>>()?,
                ),
                _ => return Err(fields.invalid("constructor-args", "`addresses` expects a list")),
            },
            "uint" => {
                let raw = scalar(value)?;
                if parse_balance(&raw).is_none() {
                    return Err(fields.invalid("constructor-args", format!("{raw:?} is not a uint256")));
                }
                ArgSpec::Uint(raw)
            }
            other => {
                return Err(fields.invalid("constructor-args", format!("unknown argument kind {other:?}")))
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    /// Solidity source.
    pub source: PathBuf,
    pub dir: PathBuf,
    pub constructor_args: Vec<ArgSpec>,
    /// Contracts passed to this contract's post-deploy `setup(address)` call, in order.
    pub setup: Vec<String>,
    /// When set, runtime bytecode is seeded into genesis at this address instead of deployed.
    pub genesis_address: Option<Address>,
}

impl Contract {
    pub(crate) fn from_yaml(
        name: String,
        body: &serde_yaml::Value,
        net_dir: &Path,
        workdir: &Path,
    ) -> Result<Self, TopologyError> {
        let fields = Fields::new(format!("contract '{name}'"), body)?;
        let source = workdir.join(fields.required_str("path")?);
        let mut constructor_args = Vec::new();
        if let Some(items) = fields.optional_list("constructor-args")? {
            for (key, value) in fields.named_entries("constructor-args", items)? {
                constructor_args.push(ArgSpec::parse(&fields, &key, value)?);
            }
        }
        let setup = fields.optional_str_list("setup")?;
        let genesis_address = fields.optional_parsed("genesis-address")?;
        let dir = net_dir.join("contracts").join(&name);
        Ok(Contract { name, source, dir, constructor_args, setup, genesis_address })
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.join("bin")
    }

    pub fn bytecode_file(&self) -> PathBuf {
        self.bin_dir().join(format!("{}.bin", self.name))
    }

    /// Runtime bytecode, seeded into genesis for contracts with a `genesis-address`.
    pub fn runtime_bytecode_file(&self) -> PathBuf {
        self.bin_dir().join(format!("{}.bin-runtime", self.name))
    }

    pub fn abi_file(&self) -> PathBuf {
        self.dir.join(format!("{}.abi", self.name))
    }

    /// Persisted deployment record `{addr, abi}`.
    pub fn info_file(&self) -> PathBuf {
        self.dir.join("info.json")
    }

    /// File name of the connection descriptor copied into every node directory.
    pub fn descriptor_file_name(&self) -> String {
        format!("{}-contract.info", self.name)
    }

    /// Contracts whose address is needed to construct this one.
    pub fn constructor_dependencies(&self) -> impl Iterator<Item = &str> {
        self.constructor_args.iter().filter_map(|arg| match arg {
            ArgSpec::Contract(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Constructor dependencies followed by setup dependencies.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.constructor_dependencies().chain(self.setup.iter().map(String::as_str))
    }

    /// Roles whose `main` accounts the constructor needs.
    pub(crate) fn referenced_roles(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.constructor_args.iter().filter_map(|arg| match arg {
            ArgSpec::RoleAccounts(kind) | ArgSpec::TokenHolders(kind) => Some(*kind),
            _ => None,
        })
    }
}
