use assert_matches::assert_matches;
use consortium::accounts::AddressBook;
use consortium::bootstrap::init_network;
use consortium::deploy::{self, compile_contracts, constructor_tokens, Confirmation, ContractRecord};
use consortium::test_utils::{contracts_yaml, fake_context, FakeChain, Fakes};
use consortium::{Context, Error, Mode};
use consortium_network_configs::test_utils::network_yaml;
use std::collections::BTreeMap;
use std::time::Duration;

const CONFIRMATION: Confirmation =
    Confirmation { timeout: Duration::from_secs(10), poll: Duration::from_millis(1) };

fn initialized(dir: &std::path::Path) -> (Context, Fakes) {
    let (ctx, fakes) =
        fake_context(dir, &(network_yaml(3, "1000") + &contracts_yaml()), Mode::Process);
    init_network(&ctx, false).unwrap();
    compile_contracts(&ctx.network, ctx.delegates.compiler.as_ref()).unwrap();
    (ctx, fakes)
}

#[tokio::test]
async fn deploys_in_dependency_order_and_wires_setup() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _fakes) = initialized(dir.path());
    let net = &ctx.network;
    let chain = FakeChain::default();
    chain.state.lock().unwrap().pending_polls = 2;

    let deployed = deploy::deploy(net, &chain, CONFIRMATION).await.unwrap();
    let governing = FakeChain::contract_address(1);
    let cbdc = FakeChain::contract_address(2);
    let ccbdc = FakeChain::contract_address(3);
    assert_eq!(
        deployed,
        [("Governing".to_string(), governing), ("CBDC".to_string(), cbdc), ("CCBDC".to_string(), ccbdc)]
    );

    let sent = chain.sent();
    assert_eq!(sent.len(), 5);
    let book = AddressBook::load(net).unwrap();
    let deployer = book.get("m0", "main").unwrap();
    assert!(sent.iter().all(|tx| tx.from == deployer));
    assert!(sent[..3].iter().all(|tx| tx.to.is_none()));
    // CBDC is constructed with the address of Governing.
    assert!(sent[1].data.contains(&hex::encode(governing.0)));
    assert!(!sent[0].data.contains(&hex::encode(governing.0)));

    assert_eq!(sent[3].to, Some(cbdc));
    assert!(sent[3].data.ends_with(&hex::encode(ccbdc.0)));
    assert_eq!(sent[4].to, Some(ccbdc));
    assert!(sent[4].data.ends_with(&hex::encode(cbdc.0)));

    for contract in &net.contracts {
        let record = ContractRecord::load(contract).unwrap().unwrap();
        assert_eq!(record.wired, !contract.setup.is_empty());
        for node in net.nodes() {
            let descriptor: serde_json::Value =
                serde_json::from_slice(&std::fs::read(node.contract_descriptor(contract)).unwrap())
                    .unwrap();
            assert_eq!(descriptor, serde_json::json!({"addr": record.addr, "abi": record.abi}));
        }
    }
}

#[tokio::test]
async fn deployment_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _fakes) = initialized(dir.path());
    let chain = FakeChain::default();
    let first = deploy::deploy(&ctx.network, &chain, CONFIRMATION).await.unwrap();
    let second = deploy::deploy(&ctx.network, &chain, CONFIRMATION).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(chain.sent().len(), 5);
}

#[tokio::test]
async fn reverted_root_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _fakes) = initialized(dir.path());
    let chain = FakeChain::default();
    chain.state.lock().unwrap().revert = true;
    assert_matches!(
        deploy::deploy(&ctx.network, &chain, CONFIRMATION).await,
        Err(Error::TransactionFailed { contract, .. }) if contract == "Governing"
    );
    assert_eq!(chain.sent().len(), 1);
    for contract in &ctx.network.contracts {
        assert_eq!(ContractRecord::load(contract).unwrap(), None);
    }
}

#[tokio::test]
async fn unconfirmed_transaction_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _fakes) = initialized(dir.path());
    let chain = FakeChain::default();
    chain.state.lock().unwrap().stall = true;
    let confirmation = Confirmation { timeout: Duration::from_millis(50), ..CONFIRMATION };
    assert_matches!(
        deploy::deploy(&ctx.network, &chain, confirmation).await,
        Err(Error::ConfirmationTimeout { contract, .. }) if contract == "Governing"
    );
}

#[test]
fn dependent_needs_persisted_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _fakes) = initialized(dir.path());
    let net = &ctx.network;
    let book = AddressBook::load(net).unwrap();
    let cbdc = net.contract("CBDC").unwrap();
    assert_matches!(
        constructor_tokens(net, cbdc, &BTreeMap::new(), &book),
        Err(Error::DependencyNotDeployed { dependency, .. }) if dependency == "Governing"
    );
}

#[tokio::test]
async fn deployer_must_declare_main_account() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = network_yaml(1, "1").replace("- main: {passphrase: maintain", "- ops: {passphrase: maintain");
    let (ctx, _fakes) = fake_context(dir.path(), &yaml, Mode::Process);
    assert_matches!(
        deploy::deploy(&ctx.network, &FakeChain::default(), CONFIRMATION).await,
        Err(Error::NoDeployer)
    );
}
