use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use consortium::deploy::{self, Confirmation};
use consortium::lifecycle::{self, NodeState};
use consortium::{bootstrap, provision, Context, Delegates, Mode};
use consortium_network_configs::Network;
use consortium_o11y::{default_subscriber, ColorOutput, EnvFilterBuilder};
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory under the working directory holding the persisted log.
const LOG_DIR: &str = ".netctl";
const LOG_FILE: &str = "netctl.log";

/// Bootstraps and operates a permissioned consortium network
#[derive(Parser, Debug)]
#[clap(version = crate::NETCTL_VERSION.as_str())]
#[clap(subcommand_required = true, arg_required_else_help = true)]
pub(super) struct NetctlCmd {
    #[clap(flatten)]
    opts: NetctlOpts,
    #[clap(subcommand)]
    subcmd: NetctlSubCommand,
}

#[derive(Args, Debug)]
struct NetctlOpts {
    /// Network declaration, relative to the working directory.
    #[clap(long, default_value = "network.yaml")]
    config: PathBuf,
    /// Working directory. Relative paths of the declaration are resolved against it and the
    /// network directory is created in it.
    #[clap(long, default_value = ".")]
    workdir: PathBuf,
    /// Run nodes as local processes instead of containers.
    #[clap(long)]
    no_container: bool,
    /// Print the whole error chain on failure.
    #[clap(long)]
    dev: bool,
    /// Sets verbose logging for the given target, or for all targets if no target is given.
    #[clap(long, value_name = "TARGET", num_args = 0..=1, default_missing_value = "")]
    verbose: Option<String>,
    /// Whether the log output on stderr is colored.
    #[clap(long, value_enum, default_value_t)]
    color: ColorOutput,
}

#[derive(Subcommand, Debug)]
enum NetctlSubCommand {
    /// Creates the container network and builds the node images.
    Prepare(PrepareCmd),
    /// Builds the network: key sets, accounts, genesis, peer lists, and initialized nodes.
    Init(InitCmd),
    /// Starts every node.
    Up(UpCmd),
    /// Stops every running node.
    Down(DownCmd),
    /// Stops every node and deletes the network directory.
    Clean(CleanCmd),
    /// Deploys the network's contracts from the first maintainer's `main` account.
    Setup(SetupCmd),
    /// Prints the state of every node and the address of every contract.
    Status(StatusCmd),
}

impl NetctlCmd {
    pub(super) fn dev(&self) -> bool {
        self.opts.dev
    }

    pub(super) fn run(self) -> anyhow::Result<()> {
        let workdir = absolute(&self.opts.workdir)?;
        let env_filter = EnvFilterBuilder::from_env()
            .verbose(self.opts.verbose.as_deref())
            .finish()
            .context("invalid logging directives provided")?;
        let log_file = workdir.join(LOG_DIR).join(LOG_FILE);
        let _subscriber = default_subscriber(env_filter, self.opts.color, Some(&log_file))?
            .global()?;
        info!(target: "netctl", version = %crate::NETCTL_VERSION.as_str(), workdir = %workdir.display(), "starting");

        let result = self.run_subcommand(&workdir);
        if let Err(err) = &result {
            tracing::error!(target: "netctl", "{err:?}");
        }
        result
    }

    fn run_subcommand(self, workdir: &Path) -> anyhow::Result<()> {
        let config = workdir.join(&self.opts.config);
        let network = Network::from_file(&config, workdir)?;
        info!(target: "config", network = %network.name, config = %config.display(), "loaded network declaration");
        let mode = if self.opts.no_container { Mode::Process } else { Mode::Container };
        let delegates = Delegates::from_config(&network.toolchain);
        let ctx = Context::new(network, delegates, mode);

        match self.subcmd {
            NetctlSubCommand::Prepare(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Init(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Up(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Down(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Clean(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Setup(cmd) => cmd.run(&ctx),
            NetctlSubCommand::Status(cmd) => cmd.run(&ctx),
        }
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not determine the current directory")?;
    Ok(cwd.join(path))
}

#[derive(Args, Debug)]
struct PrepareCmd {}

impl PrepareCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        if !ctx.mode.is_container() {
            tracing::warn!(target: "netctl", "nothing to prepare without containers");
            return Ok(());
        }
        Ok(bootstrap::prepare(ctx)?)
    }
}

#[derive(Args, Debug)]
struct InitCmd {
    /// Stop and delete an existing network first.
    #[clap(long)]
    reset: bool,
}

impl InitCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        Ok(bootstrap::init_network(ctx, self.reset)?)
    }
}

#[derive(Args, Debug)]
struct UpCmd {}

impl UpCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        let result = lifecycle::up_all(ctx);
        if ctx.network.dir.is_dir() {
            print_nodes(ctx)?;
        }
        Ok(result?)
    }
}

#[derive(Args, Debug)]
struct DownCmd {}

impl DownCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        Ok(lifecycle::down_all(ctx)?)
    }
}

#[derive(Args, Debug)]
struct CleanCmd {
    /// Also remove the container network and the node images.
    #[clap(long)]
    docker: bool,
}

impl CleanCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        Ok(bootstrap::clean(ctx, self.docker)?)
    }
}

#[derive(Args, Debug)]
struct SetupCmd {}

impl SetupCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        let net = &ctx.network;
        provision::ensure_exists(net)?;
        let deployer = net.deployer().ok_or(consortium::Error::NoDeployer)?;
        deploy::compile_contracts(net, ctx.delegates.compiler.as_ref())?;
        let client = consortium_jsonrpc_client::new_client(&deployer.rpc_url())?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("could not start the async runtime")?;
        let deployed = runtime.block_on(deploy::deploy_until_cancelled(
            net,
            &client,
            Confirmation::from_network(net),
        ))?;
        for (name, address) in deployed {
            println!("{name:<20} {address}");
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
struct StatusCmd {}

impl StatusCmd {
    fn run(self, ctx: &Context) -> anyhow::Result<()> {
        provision::ensure_exists(&ctx.network)?;
        print_nodes(ctx)?;
        let contracts = deploy::deployed_contracts(&ctx.network)?;
        if !contracts.is_empty() {
            println!();
            for (contract, address) in contracts {
                match address {
                    Some(address) => println!("{:<20} {address}", contract.name),
                    None => println!("{:<20} not deployed", contract.name),
                }
            }
        }
        Ok(())
    }
}

fn print_nodes(ctx: &Context) -> anyhow::Result<()> {
    for (node, state) in lifecycle::statuses(ctx)? {
        let endpoint = match &state {
            NodeState::Running(_) => node.rpc_url(),
            _ => String::new(),
        };
        println!(
            "{:<12} {:<10} {:<8} {:<24} {endpoint}",
            node.name,
            node.kind.to_string(),
            node.org,
            state.to_string()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags() {
        let cmd = NetctlCmd::try_parse_from([
            "netctl",
            "--config",
            "nets/consortium.yaml",
            "--no-container",
            "--verbose",
            "--color",
            "never",
            "init",
            "--reset",
        ])
        .unwrap();
        assert_eq!(cmd.opts.config, Path::new("nets/consortium.yaml"));
        assert!(cmd.opts.no_container);
        assert_eq!(cmd.opts.verbose.as_deref(), Some(""));
        assert_eq!(cmd.opts.color, ColorOutput::Never);
        assert!(matches!(cmd.subcmd, NetctlSubCommand::Init(InitCmd { reset: true })));
    }

    #[test]
    fn defaults() {
        let cmd = NetctlCmd::try_parse_from(["netctl", "--verbose", "deploy", "up"]).unwrap();
        assert_eq!(cmd.opts.config, Path::new("network.yaml"));
        assert_eq!(cmd.opts.workdir, Path::new("."));
        assert!(!cmd.opts.no_container && !cmd.dev());
        assert_eq!(cmd.opts.verbose.as_deref(), Some("deploy"));
        assert_eq!(cmd.opts.color, ColorOutput::Auto);
        assert!(matches!(cmd.subcmd, NetctlSubCommand::Up(_)));
    }

    #[test]
    fn clean_docker_flag() {
        let cmd = NetctlCmd::try_parse_from(["netctl", "clean", "--docker"]).unwrap();
        assert!(matches!(cmd.subcmd, NetctlSubCommand::Clean(CleanCmd { docker: true })));
        assert!(NetctlCmd::try_parse_from(["netctl"]).is_err());
        assert!(NetctlCmd::try_parse_from(["netctl", "deploy"]).is_err());
    }

    #[test]
    fn shipped_declaration_parses() {
        let workdir = tempfile::tempdir().unwrap();
        let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("res").join("network.yaml");
        let net = Network::from_file(&config, workdir.path()).unwrap();
        net.check_container_endpoints().unwrap();
        assert_eq!(net.deployer().map(|n| n.name.as_str()), Some("maintainer1"));
        assert!(consortium::deploy::deployment_order(&net).is_ok());
    }
}
