use super::{run_delegate, ContractCompiler, Limits};
use crate::error::{Error, Result};
use consortium_network_configs::Contract;
use std::path::PathBuf;
use std::process::Command;

pub struct Solc {
    binary: PathBuf,
    limits: Limits,
}

impl Solc {
    pub fn new(binary: PathBuf, limits: Limits) -> Self {
        Solc { binary, limits }
    }
}

impl ContractCompiler for Solc {
    fn compile(&self, contract: &Contract, runtime: bool) -> Result<()> {
        let failed = |err: Error| Error::ContractCompilation {
            contract: contract.name.clone(),
            reason: err.to_string(),
        };
        let mut command = Command::new(&self.binary);
        command
            .args(["--overwrite", "--optimize", "--optimize-runs=1000"])
            .arg(if runtime { "--bin-runtime" } else { "--bin" })
            .arg("-o")
            .arg(contract.bin_dir())
            .arg(&contract.source);
        run_delegate(command, None, self.limits).map_err(failed)?;

        let mut command = Command::new(&self.binary);
        command.args(["--abi", "--overwrite", "-o"]).arg(&contract.dir).arg(&contract.source);
        run_delegate(command, None, self.limits).map_err(failed)?;
        Ok(())
    }
}
