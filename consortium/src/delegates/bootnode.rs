use super::{run_delegate, Limits, NodeKeyTool};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Quorum's `bootnode`, used only for its key utilities.
pub struct Bootnode {
    binary: PathBuf,
    limits: Limits,
}

impl Bootnode {
    pub fn new(binary: PathBuf, limits: Limits) -> Self {
        Bootnode { binary, limits }
    }

    fn describe(&self, args: &str) -> String {
        format!("{} {args}", self.binary.display())
    }
}

impl NodeKeyTool for Bootnode {
    fn generate(&self, nodekey: &Path) -> Result<()> {
        let mut command = Command::new(&self.binary);
        command.arg("--genkey").arg(nodekey);
        run_delegate(command, None, self.limits).map(drop)
    }

    fn public_key(&self, nodekey: &Path) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command.arg("--nodekey").arg(nodekey).arg("--writeaddress");
        let out = run_delegate(command, None, self.limits)?;
        parse_public_key(&out).ok_or_else(|| Error::MalformedDelegateOutput {
            command: self.describe("--writeaddress"),
            reason: format!("expected a hex public key, got {:?}", out.trim()),
        })
    }
}

fn parse_public_key(out: &str) -> Option<String> {
    let key = out.trim();
    (key.len() == 128 && key.bytes().all(|b| b.is_ascii_hexdigit())).then(|| key.to_string())
}
