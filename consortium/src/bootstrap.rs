//! The `prepare`, `init` and `clean` pipelines.
//!
//! `init` reconciles the declared topology into a running-ready network, strictly in this
//! order: directories, validator key sets, node keys of the other nodes, accounts, genesis,
//! peer lists, node descriptors, node initialization. Any failure aborts; recovery is `init --reset`.
use crate::accounts::{self, AddressBook};
use crate::delegates::current_uid;
use crate::deploy::ContractRecord;
use crate::error::{Error, Result};
use crate::genesis::{self, allocations, compose_genesis, publish_genesis};
use crate::lifecycle;
use crate::provision;
use crate::state::NodeInfo;
use crate::validators::setup_validators;
use crate::{discovery, Context};
use consortium_network_configs::Enode;
use std::collections::HashMap;
use std::path::PathBuf;

/// Base image every other image builds on.
const BASE_IMAGE: &str = "quorum-node";

/// Creates the container network and builds one image per directory under the images
/// directory, the base image first.
pub fn prepare(ctx: &Context) -> Result<()> {
    let net = &ctx.network;
    let settings = &net.container;
    ctx.delegates.containers.create_network(&net.name, &settings.network_driver, &settings.subnet)?;
    tracing::info!(target: "bootstrap", network = %net.name, subnet = %settings.subnet, "created container network");

    let build_args = [
        ("UID".to_string(), current_uid().to_string()),
        ("DOCKER_GETH_PORT".to_string(), settings.geth_port.to_string()),
        ("DOCKER_RPC_PORT".to_string(), settings.rpc_port.to_string()),
    ];
    for (image, context) in image_dirs(ctx)? {
        tracing::info!(target: "bootstrap", %image, "building image");
        ctx.delegates.containers.build_image(&image_tag(&image), &context, &build_args)?;
    }
    Ok(())
}

fn image_tag(image: &str) -> String {
    format!("{image}:latest")
}

/// `(image, build context)` for every image directory, the base image first.
fn image_dirs(ctx: &Context) -> Result<Vec<(String, PathBuf)>> {
    let root = &ctx.network.toolchain.images_dir;
    let entries = std::fs::read_dir(root).map_err(|err| Error::Io(root.clone(), err))?;
    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::Io(root.clone(), err))?;
        let path = entry.path();
        if path.is_dir() {
            images.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    images.sort_by(|(a, _), (b, _)| (a != BASE_IMAGE).cmp(&(b != BASE_IMAGE)).then(a.cmp(b)));
    Ok(images)
}

/// Stops running nodes and deletes the network directory.
///
/// With `containers`, the container network and images go too, and a missing network directory
/// is tolerated.
pub fn clean(ctx: &Context, containers: bool) -> Result<()> {
    let net = &ctx.network;
    if net.dir.is_dir() {
        lifecycle::down_all(ctx)?;
    }
    provision::remove_network_dir(net, containers)?;
    tracing::info!(target: "bootstrap", dir = %net.dir.display(), "removed network directory");
    if containers {
        ctx.delegates.containers.remove_network(&net.name)?;
        for (image, _) in image_dirs(ctx)?.into_iter().rev() {
            ctx.delegates.containers.remove_image(&image_tag(&image))?;
        }
        tracing::info!(target: "bootstrap", network = %net.name, "removed container network and images");
    }
    Ok(())
}

/// Builds the network from its declaration.
///
/// Fails with [`Error::NetworkAlreadyExists`] if the network directory exists, unless `reset`
/// is set, in which case the existing network is stopped and deleted first.
pub fn init_network(ctx: &Context, reset: bool) -> Result<()> {
    let net = &ctx.network;
    let containerized = ctx.mode.is_container();
    if containerized {
        net.check_container_endpoints()?;
    }
    if reset && net.dir.exists() {
        clean(ctx, false)?;
    }

    provision::create_hierarchy(net, false)?;
    let bootstrap = setup_validators(net, ctx.delegates.bft.as_ref())?;
    let node_keys = discovery::generate_node_keys(net, ctx.delegates.keys.as_ref(), containerized)?;
    let book = accounts::provision_accounts(net, ctx.delegates.node.as_ref())?;

    let seeded = genesis::seeded_contracts(net, ctx.delegates.compiler.as_ref())?;
    let doc = compose_genesis(&bootstrap.genesis, &allocations(net, &book)?, &seeded)?;
    publish_genesis(net, &doc)?;

    let enodes = discovery::propagate(net, &bootstrap.enodes, containerized)?;
    write_node_descriptors(ctx, &book, &enodes, &node_keys)?;
    for contract in &seeded {
        if let Some(decl) = net.contract(&contract.name) {
            ContractRecord::from_artifacts(decl, contract.address)?.save(decl)?;
        }
    }

    lifecycle::init_all(ctx)?;
    tracing::info!(
        target: "bootstrap",
        network = %net.name,
        validators = net.validators.len(),
        nodes = net.nodes().count(),
        "network initialized"
    );
    Ok(())
}

fn write_node_descriptors(
    ctx: &Context,
    book: &AddressBook,
    validator_enodes: &[Enode],
    node_keys: &[(String, Enode)],
) -> Result<()> {
    let net = &ctx.network;
    let enodes: HashMap<&str, &Enode> = net
        .validators
        .iter()
        .map(|validator| validator.name.as_str())
        .zip(validator_enodes)
        .chain(node_keys.iter().map(|(name, enode)| (name.as_str(), enode)))
        .collect();
    for node in net.nodes() {
        let enode = enodes.get(node.name.as_str()).copied();
        NodeInfo::new(node, enode, book.accounts_of(&node.name)).save(node)?;
    }
    Ok(())
}
