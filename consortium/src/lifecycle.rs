//! Node lifecycle: `Uninitialized -> Initialized -> Running <-> Stopped`.
//!
//! A node is running iff its liveness marker resolves to a process or container the host
//! reports alive. A process only counts if its start time still matches the marker, so a pid
//! reused after a reboot is never taken for the node. A marker pointing at something dead is
//! cleaned up and the node counts as stopped.
use crate::delegates::{ContainerSpec, RunOptions};
use crate::error::{Error, Result};
use crate::provision;
use crate::state::{LivenessMarker, NodeInfo, ProcessMarker};
use crate::{Context, Mode};
use consortium_network_configs::Node;
use rayon::prelude::*;
use std::fs::OpenOptions;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initialized,
    Running(LivenessMarker),
    Stopped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Uninitialized => f.write_str("uninitialized"),
            NodeState::Initialized => f.write_str("initialized"),
            NodeState::Running(marker) => write!(f, "running ({marker})"),
            NodeState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Whether the node binary has initialized the node's private state.
pub fn is_initialized(node: &Node) -> bool {
    node.init_markers().iter().all(|file| file.is_file())
}

/// Checks whether `pid` names a live process.
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else { return false };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks.
    let ret = unsafe { libc::kill(pid, 0) };
    ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Start time of `pid` in clock ticks since boot, from `/proc/<pid>/stat`.
pub fn process_start_time(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name in field 2 may contain spaces; everything after it is space-separated.
    let (_, rest) = stat.rsplit_once(')')?;
    // `rest` starts at field 3 (state); the start time is field 22.
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// Whether the process the marker recorded is still the one running under its pid.
fn process_matches(marker: &ProcessMarker) -> bool {
    process_alive(marker.pid) && process_start_time(marker.pid) == marker.start_time
}

/// Sends `signal` to `pid`. Returns `false` if there is no such process.
fn signal(pid: u32, signal: libc::c_int) -> Result<bool> {
    let Ok(raw) = libc::pid_t::try_from(pid) else { return Ok(false) };
    // SAFETY: sending a signal has no memory-safety preconditions.
    if unsafe { libc::kill(raw, signal) } == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        _ => Err(Error::Signal { pid, source: err }),
    }
}

fn marker_alive(ctx: &Context, marker: &LivenessMarker) -> Result<bool> {
    match marker {
        LivenessMarker::Process(process) => Ok(process_matches(process)),
        LivenessMarker::Container(id) => ctx.delegates.containers.is_alive(id),
    }
}

/// Current state of `node`. Heals a marker that points at a dead process or container.
pub fn classify(ctx: &Context, node: &Node) -> Result<NodeState> {
    if !is_initialized(node) {
        return Ok(NodeState::Uninitialized);
    }
    if let Some(marker) = LivenessMarker::load(node)? {
        if marker_alive(ctx, &marker)? {
            return Ok(NodeState::Running(marker));
        }
        tracing::warn!(target: "lifecycle", node = %node.name, %marker, "liveness marker points at a dead node");
        LivenessMarker::remove(node)?;
        NodeInfo::mark_stopped(node, true)?;
        return Ok(NodeState::Stopped);
    }
    let stopped = NodeInfo::load(node)?.map_or(false, |info| info.stopped);
    Ok(if stopped { NodeState::Stopped } else { NodeState::Initialized })
}

/// Initializes the node from the genesis and peer list already in its directory.
pub fn init(ctx: &Context, node: &Node) -> Result<()> {
    let missing: Vec<_> = node.setup_files().into_iter().filter(|file| !file.is_file()).collect();
    if !missing.is_empty() {
        return Err(Error::NodeNotSetup { node: node.name.clone(), missing });
    }
    if is_initialized(node) {
        return Err(Error::AlreadyInitialized(node.name.clone()));
    }
    ctx.delegates.node.init(&node.dir)?;
    tracing::info!(target: "lifecycle", node = %node.name, "initialized");
    Ok(())
}

fn run_options(ctx: &Context, node: &Node) -> Result<RunOptions> {
    let (p2p_port, rpc_port) = match ctx.mode {
        Mode::Process => (node.port, node.rpc_port),
        Mode::Container => {
            let endpoint =
                node.container.ok_or_else(|| Error::MissingContainerEndpoint(node.name.clone()))?;
            (endpoint.port, endpoint.rpc_port)
        }
    };
    Ok(RunOptions {
        chain_id: ctx.network.chain_id,
        p2p_port,
        rpc_port,
        validator: node.kind.is_validator(),
        block_period: ctx.network.toolchain.block_period,
    })
}

/// Starts an initialized or stopped node.
///
/// A node that is already running is refused with [`Error::NodeAlreadyRunning`] and its
/// liveness marker is left as it is.
pub fn up(ctx: &Context, node: &Node) -> Result<LivenessMarker> {
    match classify(ctx, node)? {
        NodeState::Uninitialized => return Err(Error::NodeNotInitialized(node.name.clone())),
        NodeState::Running(_) => return Err(Error::NodeAlreadyRunning(node.name.clone())),
        NodeState::Initialized | NodeState::Stopped => {}
    }
    let options = run_options(ctx, node)?;
    let marker = match ctx.mode {
        Mode::Process => spawn_process(ctx, node, &options)?,
        Mode::Container => start_container(ctx, node, &options)?,
    };
    marker.save(node)?;
    NodeInfo::mark_stopped(node, false)?;
    tracing::info!(target: "lifecycle", node = %node.name, %marker, "started");
    Ok(marker)
}

fn spawn_process(ctx: &Context, node: &Node, options: &RunOptions) -> Result<LivenessMarker> {
    let log_file = node.log_file();
    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|err| Error::Io(log_file.clone(), err))
    };
    let program = ctx.delegates.node.program();
    let mut command = Command::new(program);
    command
        .args(ctx.delegates.node.run_args(options))
        .current_dir(&node.dir)
        .stdin(Stdio::null())
        .stdout(open_log()?)
        .stderr(open_log()?);
    tracing::debug!(target: "delegate", node = %node.name, ?command, "spawning node");
    let mut child = command.spawn().map_err(|err| Error::DelegateFailed {
        command: program.display().to_string(),
        reason: err.to_string(),
    })?;
    let pid = child.id();
    let start_time = process_start_time(pid);
    // Reap the child if it exits while this process is still around.
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(LivenessMarker::Process(ProcessMarker { pid, start_time }))
}

fn start_container(ctx: &Context, node: &Node, options: &RunOptions) -> Result<LivenessMarker> {
    let endpoint =
        node.container.ok_or_else(|| Error::MissingContainerEndpoint(node.name.clone()))?;
    let program = ctx
        .delegates
        .node
        .program()
        .file_name()
        .map_or_else(|| "geth".to_string(), |name| name.to_string_lossy().into_owned());
    let mut command = vec![program];
    command.extend(ctx.delegates.node.run_args(options));
    let spec = ContainerSpec {
        name: node.name.clone(),
        image: node.kind.as_str().to_string(),
        network: ctx.network.name.clone(),
        ip: endpoint.ip,
        host_dir: node.dir.clone(),
        workdir: ctx.network.container.workdir.clone(),
        ports: vec![(node.rpc_port, endpoint.rpc_port), (node.port, endpoint.port)],
        command,
    };
    let id = ctx.delegates.containers.run(&spec)?;
    Ok(LivenessMarker::Container(id))
}

/// Stops a running node. Returns whether there was anything to stop; a node that is not
/// running is left alone.
pub fn down(ctx: &Context, node: &Node) -> Result<bool> {
    let marker = match classify(ctx, node)? {
        NodeState::Running(marker) => marker,
        state => {
            tracing::debug!(target: "lifecycle", node = %node.name, %state, "not running");
            return Ok(false);
        }
    };
    match &marker {
        LivenessMarker::Process(process) => terminate(
            process,
            ctx.network.toolchain.shutdown_timeout(),
            ctx.network.toolchain.poll_interval(),
        )?,
        LivenessMarker::Container(id) => ctx.delegates.containers.stop(id)?,
    }
    LivenessMarker::remove(node)?;
    NodeInfo::mark_stopped(node, true)?;
    tracing::info!(target: "lifecycle", node = %node.name, %marker, "stopped");
    Ok(true)
}

/// SIGTERM, then SIGKILL if the process outlives `timeout`. Fails if the process cannot be
/// signalled or survives the SIGKILL.
fn terminate(process: &ProcessMarker, timeout: Duration, poll: Duration) -> Result<()> {
    let pid = process.pid;
    if !signal(pid, libc::SIGTERM)? || exited_within(process, timeout, poll) {
        return Ok(());
    }
    tracing::warn!(target: "lifecycle", pid, ?timeout, "process ignored SIGTERM, killing");
    if !signal(pid, libc::SIGKILL)? || exited_within(process, timeout, poll) {
        return Ok(());
    }
    Err(Error::ProcessSurvived(pid))
}

fn exited_within(process: &ProcessMarker, timeout: Duration, poll: Duration) -> bool {
    let started = Instant::now();
    while process_matches(process) {
        if started.elapsed() > timeout {
            return false;
        }
        std::thread::sleep(poll);
    }
    true
}

/// Runs `op` on every node in parallel. All nodes are attempted; the first error is returned.
fn for_all_nodes<T: Send>(
    ctx: &Context,
    op: impl Fn(&Context, &Node) -> Result<T> + Sync,
) -> Result<Vec<T>> {
    let nodes: Vec<&Node> = ctx.network.nodes().collect();
    let results: Vec<Result<T>> = nodes.par_iter().map(|node| op(ctx, node)).collect();
    let mut values = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (node, result) in nodes.iter().zip(results) {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                tracing::error!(target: "lifecycle", node = %node.name, %err, "operation failed");
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(values),
    }
}

pub fn init_all(ctx: &Context) -> Result<()> {
    for node in ctx.network.nodes() {
        init(ctx, node)?;
    }
    Ok(())
}

/// Starts every node.
pub fn up_all(ctx: &Context) -> Result<()> {
    provision::ensure_exists(&ctx.network)?;
    if ctx.mode.is_container() {
        ctx.network.check_container_endpoints()?;
    }
    for_all_nodes(ctx, up).map(drop)
}

/// Stops every running node.
pub fn down_all(ctx: &Context) -> Result<()> {
    provision::ensure_exists(&ctx.network)?;
    for_all_nodes(ctx, down).map(drop)
}

/// State of every node, in node order.
pub fn statuses(ctx: &Context) -> Result<Vec<(&Node, NodeState)>> {
    ctx.network.nodes().map(|node| Ok((node, classify(ctx, node)?))).collect()
}
