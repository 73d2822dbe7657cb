use super::{run_delegate, BftSetup, Limits};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// `istanbul setup`, from istanbul-tools.
pub struct Istanbul {
    binary: PathBuf,
    limits: Limits,
}

impl Istanbul {
    pub fn new(binary: PathBuf, limits: Limits) -> Self {
        Istanbul { binary, limits }
    }
}

impl BftSetup for Istanbul {
    fn setup(&self, dir: &Path, count: usize) -> Result<()> {
        let mut command = Command::new(&self.binary);
        command
            .current_dir(dir)
            .args(["setup", "--num"])
            .arg(count.to_string())
            .args(["--nodes", "--quorum", "--save", "--verbose"]);
        let out = run_delegate(command, None, self.limits)?;
        tracing::trace!(target: "delegate", %out, "istanbul setup output");
        Ok(())
    }
}
