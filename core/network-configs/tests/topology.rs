use assert_matches::assert_matches;
use consortium_network_configs::test_utils::network_yaml;
use consortium_network_configs::{ArgSpec, Network, NodeKind, TopologyError};
use std::path::Path;

const CONTRACTS: &str = "  governors:
    - g0:
        org: org2
        ip: 127.0.0.1
        port: 30500
        rpc-port: 8700
        accounts:
          - main: {passphrase: govern}
  bankers:
    - b0:
        org: org2
        ip: 127.0.0.1
        port: 30600
        rpc-port: 8800
        token-supply: 5000
        accounts:
          - main: {passphrase: bank}
  contracts:
    - Governing:
        path: contracts/Governing.sol
        constructor-args:
          - role-accounts: governors
          - role-accounts: maintainers
          - role-accounts: observers
          - role-accounts: bankers
          - addresses: []
    - CBDC:
        path: contracts/CBDC.sol
        constructor-args:
          - contract: Governing
          - token-holders: bankers
          - token-supplies: bankers
        setup: [CCBDC]
    - CCBDC:
        path: contracts/CCBDC.sol
        constructor-args:
          - contract: Governing
        setup: [CBDC]
";

fn parse(yaml: &str) -> Result<Network, TopologyError> {
    Network::from_yaml_str(yaml, Path::new("/work"))
}

#[test]
fn parses_full_network() {
    let net = parse(&(network_yaml(3, "1000") + CONTRACTS)).unwrap();
    assert_eq!(net.chain_id, 10);
    assert_eq!(net.dir, Path::new("/work/testnet"));
    let names: Vec<_> = net.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["v0", "v1", "v2", "g0", "m0", "b0"]);
    assert_eq!(net.leader().name, "v0");
    assert_eq!(net.deployer().map(|n| n.name.as_str()), Some("m0"));

    let v1 = net.node("v1").unwrap();
    assert_eq!(v1.kind, NodeKind::Validator);
    assert_eq!(v1.dir, Path::new("/work/testnet/org2/validators/v1"));
    let container = v1.container.unwrap();
    assert_eq!(container.ip.to_string(), "172.16.239.11");
    assert_eq!((container.port, container.rpc_port), (30303, 8545));
    assert_eq!(v1.p2p_endpoint(false), Some(("127.0.0.1".parse().unwrap(), 30301)));

    let m0 = net.node("m0").unwrap();
    assert_eq!(m0.accounts[0].balance.as_deref(), Some("1000"));
    assert_eq!(net.funded_accounts().count(), 1);
    assert_eq!(net.node("b0").unwrap().token_supply.as_deref(), Some("5000"));

    let cbdc = net.contract("CBDC").unwrap();
    assert_eq!(cbdc.source, Path::new("/work/contracts/CBDC.sol"));
    assert_eq!(cbdc.bytecode_file(), Path::new("/work/testnet/contracts/CBDC/bin/CBDC.bin"));
    assert_eq!(cbdc.constructor_args[0], ArgSpec::Contract("Governing".into()));
    assert_eq!(cbdc.dependencies().collect::<Vec<_>>(), ["Governing", "CCBDC"]);
    assert_eq!(net.toolchain.geth, Path::new("/work/quorum/build/bin/geth"));
}

#[test]
fn missing_required_field_names_field_and_entity() {
    let yaml = network_yaml(1, "1").replace("        rpc-port: 8600\n", "");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::MissingRequiredField { entity, field })
            if entity == "maintainer 'm0'" && field == "rpc-port"
    );

    let yaml = network_yaml(1, "1").replace("  id: 10\n", "");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::MissingRequiredField { entity, field })
            if entity == "network" && field == "id"
    );

    let yaml = network_yaml(1, "1").replace("    subnet: 172.16.239.0/24\n", "");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::MissingRequiredField { entity, field })
            if entity == "docker-settings" && field == "subnet"
    );

    let yaml = network_yaml(1, "1").replace("{passphrase: maintain, ", "{");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::MissingRequiredField { field, .. }) if field == "passphrase"
    );
}

#[test]
fn non_validators_require_accounts() {
    let yaml = network_yaml(1, "1")
        + "  observers:\n    - o0: {org: org1, ip: 127.0.0.1, port: 30700, rpc-port: 8900}\n";
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::MissingRequiredField { entity, field })
            if entity == "observer 'o0'" && field == "accounts"
    );
}

#[test]
fn cross_references_are_checked_eagerly() {
    let yaml = network_yaml(2, "1").replace("org: org2", "org: org9");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::UnknownOrganization { node, org }) if node == "v1" && org == "org9"
    );

    let yaml = network_yaml(2, "1").replace("- v1:", "- v0:");
    assert_matches!(parse(&yaml), Err(TopologyError::DuplicateName(name)) if name == "v0");

    let yaml = network_yaml(1, "1") + &CONTRACTS.replace("setup: [CBDC]", "setup: [CBDX]");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::UnknownContract { contract, reference })
            if contract == "CCBDC" && reference == "CBDX"
    );
}

#[test]
fn constructor_cycles_are_rejected_but_setup_cycles_are_not() {
    let yaml = network_yaml(1, "1")
        + "  contracts:
    - A:
        path: a.sol
        constructor-args: [{contract: B}]
    - B:
        path: b.sol
        constructor-args: [{contract: A}]
    - C:
        path: c.sol
";
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::ConstructorCycle(names)) if names == ["A", "B"]
    );
    assert!(parse(&(network_yaml(1, "1") + CONTRACTS)).is_ok());
}

#[test]
fn malformed_values() {
    let yaml = network_yaml(1, "1").replace("ip: 127.0.0.1, port: 30300", "ip: localhost, port: 30300");
    assert_matches!(parse(&yaml), Err(TopologyError::InvalidField { field, .. }) if field == "ip");

    let yaml = network_yaml(1, "12x");
    assert_matches!(parse(&yaml), Err(TopologyError::InvalidField { field, .. }) if field == "balance");

    let yaml = network_yaml(1, "1").replace("port: 30300", "port: 70000");
    assert_matches!(parse(&yaml), Err(TopologyError::InvalidField { field, .. }) if field == "port");

    let yaml = network_yaml(0, "1");
    assert_matches!(parse(&yaml), Err(_));
}

#[test]
fn role_arguments_need_main_accounts() {
    let yaml = (network_yaml(1, "1") + CONTRACTS).replace("- main: {passphrase: govern}", "- other: {passphrase: govern}");
    assert_matches!(
        parse(&yaml),
        Err(TopologyError::InvalidField { entity, field, .. })
            if entity == "contract 'Governing'" && field == "constructor-args"
    );
}

#[test]
fn container_endpoints() {
    let net = parse(&network_yaml(2, "1")).unwrap();
    net.check_container_endpoints().unwrap();

    let yaml = network_yaml(2, "1").replace(", docker-ip: 172.16.239.11", "");
    let net = parse(&yaml).unwrap();
    assert_matches!(
        net.check_container_endpoints(),
        Err(TopologyError::MissingContainerEndpoint { node }) if node == "v1"
    );
    assert_eq!(net.node("v1").unwrap().p2p_endpoint(true), None);
}

#[test]
fn toolchain_overrides() {
    let yaml = network_yaml(1, "1") + "toolchain:\n  solc: bin/solc\n  confirmation-timeout-secs: 5\n";
    let net = parse(&yaml).unwrap();
    assert_eq!(net.toolchain.solc, Path::new("/work/bin/solc"));
    assert_eq!(net.toolchain.confirmation_timeout_secs, 5);

    let yaml = network_yaml(1, "1") + "toolchain:\n  sol: x\n";
    assert_matches!(parse(&yaml), Err(TopologyError::Yaml(_)));
}

#[test]
fn reads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.yaml");
    std::fs::write(&path, network_yaml(1, "1")).unwrap();
    let net = Network::from_file(&path, dir.path()).unwrap();
    assert_eq!(net.dir, dir.path().join("testnet"));
    assert_matches!(
        Network::from_file(&dir.path().join("nope.yaml"), dir.path()),
        Err(TopologyError::Read(..))
    );
}
