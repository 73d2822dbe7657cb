//! Network descriptions for tests.
use std::fmt::Write;

/// A network with `validators` validators spread over two organizations and one maintainer
/// `m0` whose `main` account is funded with `maintainer_balance`.
///
/// Validator `v<i>` listens on `127.0.0.1:3030<i>` and, in containers, on
/// `172.16.239.1<i>:30303`.
pub fn network_yaml(validators: usize, maintainer_balance: &str) -> String {
    let mut yaml = String::from(
        "network:
  id: 10
  name: testnet
  orgs: [org1, org2]
  docker-settings:
    network-driver: bridge
    subnet: 172.16.239.0/24
    geth-port: 30303
    rpc-port: 8545
    workdir: /home/node
  validators:
",
    );
    for i in 0..validators {
        let _ = writeln!(
            yaml,
            "    - v{i}: {{org: org{}, ip: 127.0.0.1, port: {}, rpc-port: {}, docker-ip: 172.16.239.{}}}",
            i % 2 + 1,
            30300 + i,
            8500 + i,
            10 + i,
        );
    }
    let _ = write!(
        yaml,
        "  maintainers:
    - m0:
        org: org1
        ip: 127.0.0.1
        port: 30400
        rpc-port: 8600
        docker-ip: 172.16.239.100
        accounts:
          - main: {{passphrase: maintain, balance: {maintainer_balance}}}
"
    );
    yaml
}
