use super::{run_delegate, Limits, NodeBinary, RunOptions};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// APIs exposed over JSON-RPC.
const RPC_APIS: &str = "admin,db,eth,debug,mine,net,shh,txpool,personal,web3,quorum,istanbul";

/// Quorum's `geth`. Every node keeps its private state under `data/` in its own directory.
pub struct Geth {
    binary: PathBuf,
    limits: Limits,
}

impl Geth {
    pub fn new(binary: PathBuf, limits: Limits) -> Self {
        Geth { binary, limits }
    }

    fn command(&self, node_dir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.current_dir(node_dir).args(["--datadir", "data"]);
        command
    }
}

impl NodeBinary for Geth {
    fn new_account(&self, node_dir: &Path, passphrase: &str) -> Result<String> {
        let mut command = self.command(node_dir);
        command.args(["account", "new"]);
        // Passphrase and its confirmation.
        let input = format!("{passphrase}\n{passphrase}\n");
        run_delegate(command, Some(&input), self.limits)
    }

    fn init(&self, node_dir: &Path) -> Result<()> {
        let mut command = self.command(node_dir);
        command.args(["init", "genesis.json"]);
        run_delegate(command, None, self.limits).map(drop)
    }

    fn program(&self) -> &Path {
        &self.binary
    }

    fn run_args(&self, options: &RunOptions) -> Vec<String> {
        let mut args: Vec<String> = [
            "--allow-insecure-unlock",
            "--datadir",
            "data",
            "--nodiscover",
            "--syncmode",
            "full",
            "--verbosity",
            "5",
            "--networkid",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(options.chain_id.to_string());
        args.extend(["--rpc", "--rpcaddr", "0.0.0.0", "--rpcport"].map(String::from));
        args.push(options.rpc_port.to_string());
        args.extend(["--rpcapi", RPC_APIS, "--emitcheckpoints", "--port"].map(String::from));
        args.push(options.p2p_port.to_string());
        if options.validator {
            args.extend(["--mine", "--minerthreads", "1", "--istanbul.blockperiod"].map(String::from));
            args.push(options.block_period.to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn geth() -> Geth {
        Geth::new(
            PathBuf::from("geth"),
            Limits { timeout: Duration::from_secs(1), poll: Duration::from_millis(10) },
        )
    }

    #[test]
    fn only_validators_mine() {
        let mut options =
            RunOptions { chain_id: 10, p2p_port: 30303, rpc_port: 8545, validator: true, block_period: 5 };
        let args = geth().run_args(&options).join(" ");
        assert!(args.contains("--networkid 10"), "{args}");
        assert!(args.contains("--rpcport 8545 "), "{args}");
        assert!(args.contains("--port 30303"), "{args}");
        assert!(args.ends_with("--mine --minerthreads 1 --istanbul.blockperiod 5"), "{args}");

        options.validator = false;
        let args = geth().run_args(&options).join(" ");
        assert!(!args.contains("--mine"), "{args}");
        assert!(args.ends_with("--port 30303"), "{args}");
    }
}
