//! Contract deployment: compile, deploy in dependency order, wire setup calls, and hand every
//! node a connection descriptor per contract.
//!
//! Deployment is resumable. A contract whose record is already persisted is not redeployed, and
//! a setup call already applied is not repeated.
use crate::accounts::AddressBook;
use crate::delegates::ContractCompiler;
use crate::error::{Error, Result};
use crate::files;
use consortium_jsonrpc_client::{JsonRpcClient, TransactionReceipt, TransactionRequest};
use consortium_network_configs::{Address, Contract, Network, MAIN_ACCOUNT};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

mod args;
mod graph;

pub use args::constructor_tokens;
pub use graph::deployment_order;

/// The slice of the node's JSON-RPC API deployment needs.
pub trait ChainClient: Send + Sync {
    fn unlock_account(
        &self,
        account: Address,
        passphrase: &str,
        duration_secs: u64,
    ) -> BoxFuture<'static, Result<bool>>;
    fn send_transaction(&self, tx: TransactionRequest) -> BoxFuture<'static, Result<String>>;
    /// `None` while the transaction is pending.
    fn transaction_receipt(&self, tx_hash: &str)
        -> BoxFuture<'static, Result<Option<TransactionReceipt>>>;
}

impl ChainClient for JsonRpcClient {
    fn unlock_account(
        &self,
        account: Address,
        passphrase: &str,
        duration_secs: u64,
    ) -> BoxFuture<'static, Result<bool>> {
        JsonRpcClient::unlock_account(self, account, passphrase, duration_secs)
            .map(|res| res.map_err(Error::from))
            .boxed()
    }

    fn send_transaction(&self, tx: TransactionRequest) -> BoxFuture<'static, Result<String>> {
        JsonRpcClient::send_transaction(self, tx).map(|res| res.map_err(Error::from)).boxed()
    }

    fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> BoxFuture<'static, Result<Option<TransactionReceipt>>> {
        JsonRpcClient::transaction_receipt(self, tx_hash).map(|res| res.map_err(Error::from)).boxed()
    }
}

/// Persisted in `<contract dir>/info.json`. The `{addr, abi}` part is the connection
/// descriptor copied to every node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContractRecord {
    pub addr: Address,
    pub abi: serde_json::Value,
    /// Whether the post-deploy setup calls went through.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wired: bool,
}

fn is_false(value: &bool) -> bool {
    !value
}

impl ContractRecord {
    pub fn load(contract: &Contract) -> Result<Option<Self>> {
        files::read_json_opt(&contract.info_file())
    }

    pub fn save(&self, contract: &Contract) -> Result<()> {
        files::write_json(&contract.info_file(), self)
    }

    /// Record of a contract living at `addr`, with the ABI the compiler left next to it.
    pub fn from_artifacts(contract: &Contract, addr: Address) -> Result<Self> {
        Ok(ContractRecord { addr, abi: read_abi(contract)?, wired: false })
    }

    fn descriptor(&self) -> ContractRecord {
        ContractRecord { wired: false, ..self.clone() }
    }
}

fn read_abi(contract: &Contract) -> Result<serde_json::Value> {
    let file = contract.abi_file();
    files::read_json_opt(&file)?.ok_or(Error::ArtifactMissing(file))
}

fn read_bytecode(contract: &Contract) -> Result<Vec<u8>> {
    let file = contract.bytecode_file();
    if !file.is_file() {
        return Err(Error::ArtifactMissing(file));
    }
    let text = files::read_to_string(&file)?;
    let text = text.trim();
    hex::decode(text.strip_prefix("0x").unwrap_or(text)).map_err(|err| Error::ContractCompilation {
        contract: contract.name.clone(),
        reason: format!("{}: {err}", file.display()),
    })
}

fn parse_abi(contract: &Contract, abi: &serde_json::Value) -> Result<ethabi::Contract> {
    serde_json::from_value(abi.clone())
        .map_err(|err| Error::Json(contract.abi_file(), err))
}

/// Compiles every contract that is neither deployed yet nor seeded into genesis.
pub fn compile_contracts(net: &Network, compiler: &dyn ContractCompiler) -> Result<()> {
    for contract in &net.contracts {
        if contract.genesis_address.is_some() || ContractRecord::load(contract)?.is_some() {
            continue;
        }
        compiler.compile(contract, false)?;
        tracing::info!(target: "deploy", contract = %contract.name, "compiled");
    }
    Ok(())
}

/// Timing of confirmation waits.
#[derive(Debug, Clone, Copy)]
pub struct Confirmation {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Confirmation {
    pub fn from_network(net: &Network) -> Self {
        Confirmation {
            timeout: net.toolchain.confirmation_timeout(),
            poll: net.toolchain.poll_interval(),
        }
    }
}

struct Deployer<'a> {
    net: &'a Network,
    client: &'a dyn ChainClient,
    from: Address,
    passphrase: &'a str,
    confirmation: Confirmation,
}

impl Deployer<'_> {
    /// Submits a transaction from the unlocked deployer account and waits for its receipt.
    async fn transact(&self, contract: &Contract, tx: TransactionRequest) -> Result<TransactionReceipt> {
        let unlocked = self
            .client
            .unlock_account(self.from, self.passphrase, self.confirmation.timeout.as_secs().max(1))
            .await?;
        if !unlocked {
            return Err(Error::FatalConfig(format!(
                "the node refused to unlock deployer account {}",
                self.from
            )));
        }
        let tx_hash = self.client.send_transaction(tx).await?;
        tracing::debug!(target: "deploy", contract = %contract.name, %tx_hash, "submitted");
        let receipt = self.wait_for_receipt(contract, &tx_hash).await?;
        if !receipt.succeeded() {
            return Err(Error::TransactionFailed { contract: contract.name.clone(), tx: tx_hash });
        }
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, contract: &Contract, tx_hash: &str) -> Result<TransactionReceipt> {
        let poll = async {
            loop {
                if let Some(receipt) = self.client.transaction_receipt(tx_hash).await? {
                    return Ok(receipt);
                }
                tokio::time::sleep(self.confirmation.poll).await;
            }
        };
        match tokio::time::timeout(self.confirmation.timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConfirmationTimeout {
                contract: contract.name.clone(),
                tx: tx_hash.to_string(),
                timeout: self.confirmation.timeout,
            }),
        }
    }

    async fn create(
        &self,
        contract: &Contract,
        deployed: &BTreeMap<String, Address>,
        book: &AddressBook,
    ) -> Result<ContractRecord> {
        let abi_json = read_abi(contract)?;
        let abi = parse_abi(contract, &abi_json)?;
        let code = read_bytecode(contract)?;
        let tokens = constructor_tokens(self.net, contract, deployed, book)?;
        let abi_error = |source| Error::Abi { contract: contract.name.clone(), source };
        let data = match abi.constructor() {
            Some(constructor) => constructor.encode_input(code, &tokens).map_err(abi_error)?,
            None if tokens.is_empty() => code,
            None => return Err(abi_error(ethabi::Error::InvalidData)),
        };
        let receipt =
            self.transact(contract, TransactionRequest::create(self.from, &data)).await?;
        let addr = receipt.contract_address.ok_or_else(|| Error::TransactionFailed {
            contract: contract.name.clone(),
            tx: receipt.transaction_hash.clone(),
        })?;
        Ok(ContractRecord { addr, abi: abi_json, wired: false })
    }

    /// Calls `setup(address)` once for every contract named in `contract.setup`.
    async fn wire(
        &self,
        contract: &Contract,
        record: &ContractRecord,
        deployed: &BTreeMap<String, Address>,
    ) -> Result<()> {
        let abi = parse_abi(contract, &record.abi)?;
        let abi_error = |source| Error::Abi { contract: contract.name.clone(), source };
        let setup = abi.function("setup").map_err(abi_error)?;
        for peer in &contract.setup {
            let address = deployed.get(peer).ok_or_else(|| Error::DependencyNotDeployed {
                contract: contract.name.clone(),
                dependency: peer.clone(),
            })?;
            let input = setup.encode_input(&[args::address_token(*address)]).map_err(abi_error)?;
            self.transact(contract, TransactionRequest::call(self.from, record.addr, &input)).await?;
            tracing::info!(target: "deploy", contract = %contract.name, %peer, "wired");
        }
        Ok(())
    }
}

/// Deploys every contract of the network from the deployer's `main` account.
///
/// Returns the address of every contract in deployment order. The first failure aborts the
/// remaining deployments; whatever was persisted before it is kept.
pub async fn deploy(
    net: &Network,
    client: &dyn ChainClient,
    confirmation: Confirmation,
) -> Result<Vec<(String, Address)>> {
    let deployer_node = net.deployer().ok_or(Error::NoDeployer)?;
    let account = deployer_node.account(MAIN_ACCOUNT).ok_or(Error::NoDeployer)?;
    let book = AddressBook::load(net)?;
    let deployer = Deployer {
        net,
        client,
        from: book.require(&deployer_node.name, MAIN_ACCOUNT)?,
        passphrase: &account.passphrase,
        confirmation,
    };
    let order = deployment_order(net)?;
    tracing::info!(
        target: "deploy",
        deployer = %deployer_node.name,
        order = ?order.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "deploying contracts"
    );

    let mut deployed = BTreeMap::new();
    let mut records = BTreeMap::new();
    for contract in &order {
        let record = match (ContractRecord::load(contract)?, contract.genesis_address) {
            (Some(record), _) => {
                tracing::info!(target: "deploy", contract = %contract.name, addr = %record.addr, "already deployed");
                record
            }
            (None, Some(addr)) => {
                let record = ContractRecord::from_artifacts(contract, addr)?;
                record.save(contract)?;
                record
            }
            (None, None) => {
                let record = deployer.create(contract, &deployed, &book).await?;
                record.save(contract)?;
                tracing::info!(target: "deploy", contract = %contract.name, addr = %record.addr, "deployed");
                record
            }
        };
        deployed.insert(contract.name.clone(), record.addr);
        records.insert(contract.name.clone(), record);
    }

    for contract in &order {
        let Some(record) = records.get_mut(&contract.name) else { continue };
        if contract.setup.is_empty() || record.wired {
            continue;
        }
        deployer.wire(contract, record, &deployed).await?;
        record.wired = true;
        record.save(contract)?;
    }

    distribute_descriptors(net, &records)?;
    Ok(order.iter().map(|c| (c.name.clone(), deployed[&c.name])).collect())
}

/// Like [`deploy`], but gives up with [`Error::Cancelled`] on Ctrl-C.
pub async fn deploy_until_cancelled(
    net: &Network,
    client: &dyn ChainClient,
    confirmation: Confirmation,
) -> Result<Vec<(String, Address)>> {
    tokio::select! {
        result = deploy(net, client, confirmation) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(target: "deploy", "interrupted; deployed contracts are kept");
            Err(Error::Cancelled)
        }
    }
}

fn distribute_descriptors(net: &Network, records: &BTreeMap<String, ContractRecord>) -> Result<()> {
    for contract in &net.contracts {
        let Some(record) = records.get(&contract.name) else { continue };
        let descriptor = record.descriptor();
        for node in net.nodes() {
            files::write_json(&node.contract_descriptor(contract), &descriptor)?;
        }
    }
    tracing::info!(target: "deploy", contracts = records.len(), "distributed contract descriptors");
    Ok(())
}

/// Persisted address of every contract, in declaration order. `None` for contracts not yet
/// deployed.
pub fn deployed_contracts(net: &Network) -> Result<Vec<(&Contract, Option<Address>)>> {
    net.contracts
        .iter()
        .map(|contract| Ok((contract, ContractRecord::load(contract)?.map(|r| r.addr))))
        .collect()
}
