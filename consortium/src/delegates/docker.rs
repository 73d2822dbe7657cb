use super::{run_delegate, ContainerRuntime, ContainerSpec, Limits};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Length of the short container identifier.
const SHORT_ID_LEN: usize = 12;

pub struct Docker {
    binary: PathBuf,
    limits: Limits,
}

impl Docker {
    pub fn new(binary: PathBuf, limits: Limits) -> Self {
        Docker { binary, limits }
    }

    fn exec<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command.args(args);
        run_delegate(command, None, self.limits)
    }
}

/// Arguments of `docker run` for `spec`, minus the program name.
pub(crate) fn run_args(spec: &ContainerSpec, uid: u32) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--rm".into(),
        "--user".into(),
        uid.to_string(),
        "-w".into(),
        spec.workdir.clone(),
        "-v".into(),
        format!("{}:{}", spec.host_dir.display(), spec.workdir),
        "--name".into(),
        spec.name.clone(),
        "--ip".into(),
        spec.ip.to_string(),
    ];
    for (host, container) in &spec.ports {
        args.push("-p".into());
        args.push(format!("{host}:{container}"));
    }
    args.extend(["--network".into(), spec.network.clone(), spec.image.clone()]);
    args.extend(spec.command.iter().cloned());
    args
}

pub(crate) fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

impl ContainerRuntime for Docker {
    fn create_network(&self, name: &str, driver: &str, subnet: &str) -> Result<()> {
        self.exec(["network", "create", "-d", driver, "--subnet", subnet, name]).map(drop)
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        self.exec(["network", "rm", name]).map(drop)
    }

    fn build_image(&self, tag: &str, context: &Path, build_args: &[(String, String)]) -> Result<()> {
        let mut args = vec!["build".to_string(), "-t".into(), tag.into()];
        for (key, value) in build_args {
            args.push("--build-arg".into());
            args.push(format!("{key}={value}"));
        }
        args.push(context.display().to_string());
        self.exec(args).map(drop)
    }

    fn remove_image(&self, tag: &str) -> Result<()> {
        self.exec(["image", "rm", tag]).map(drop)
    }

    fn run(&self, spec: &ContainerSpec) -> Result<String> {
        let out = self.exec(run_args(spec, current_uid()))?;
        Ok(out.trim().chars().take(SHORT_ID_LEN).collect())
    }

    fn stop(&self, id: &str) -> Result<()> {
        self.exec(["stop", id]).map(drop)
    }

    fn is_alive(&self, id: &str) -> Result<bool> {
        let filter = format!("id={id}");
        let out = self.exec(["ps", "-q", "--filter", filter.as_str()])?;
        Ok(!out.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_line() {
        let spec = ContainerSpec {
            name: "v0".into(),
            image: "validator".into(),
            network: "testnet".into(),
            ip: "172.16.239.10".parse().unwrap(),
            host_dir: PathBuf::from("/work/testnet/org1/validators/v0"),
            workdir: "/home/node".into(),
            ports: vec![(8500, 8545), (30300, 30303)],
            command: vec!["geth".into(), "--nodiscover".into()],
        };
        assert_eq!(
            run_args(&spec, 1000).join(" "),
            "run -d --rm --user 1000 -w /home/node \
             -v /work/testnet/org1/validators/v0:/home/node --name v0 --ip 172.16.239.10 \
             -p 8500:8545 -p 30300:30303 --network testnet validator geth --nodiscover"
        );
    }
}
