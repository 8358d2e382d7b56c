//! Declares the Novella stack: configuration in, typed resource graph out.

pub mod discovery;
pub mod load_balancer;
pub mod network;
pub mod registry;
pub mod security;
pub mod service;
pub mod storage;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::models::{
    Attribute, Cluster, ExecutionRole, Output, Reference, Resource, ResourceKind, Stack,
};

pub use network::Network;
pub use registry::ImagePipeline;
pub use security::SecurityGroups;
pub use storage::Storage;

pub const CLUSTER: &str = "cluster";
pub const EXECUTION_ROLE: &str = "task-execution-role";

const EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// The declared stack plus handles to the components inside it
#[derive(Debug, Clone)]
pub struct Topology {
    pub stack: Stack,
    pub network: Network,
    pub security: SecurityGroups,
    pub image: ImagePipeline,
    pub storage: Storage,
    pub app_service: String,
    pub database_service: String,
}

/// Declare every resource of the stack. `image_tag` is the tag the
/// application image is published under.
pub fn build_stack(config: &Config, image_tag: &str) -> Result<Topology> {
    let mut stack = Stack::new(&config.stack.name, &config.stack.description);

    let network = network::build_network(&mut stack, &config.network)?;
    let security = security::build_security(&mut stack, &config.security, &network)?;
    let namespace = discovery::build_namespace(&mut stack, &config.discovery, &network)?;

    stack.add(Resource::new(
        CLUSTER,
        ResourceKind::Cluster(Cluster {
            container_insights: config.stack.container_insights,
        }),
    ))?;

    let entry = load_balancer::build_load_balancer(
        &mut stack,
        &config.load_balancer,
        config.app.container_port,
        &network,
        &security,
    )?;
    let image = registry::build_registry(&mut stack, &config.app.image, image_tag)?;

    stack.add(Resource::new(
        EXECUTION_ROLE,
        ResourceKind::ExecutionRole(ExecutionRole {
            managed_policies: vec![EXECUTION_POLICY.to_string()],
        }),
    ))?;

    let placement = service::Placement {
        cluster: CLUSTER,
        namespace: &namespace,
        execution_role: EXECUTION_ROLE,
        network: &network,
        security: &security,
        log_retention_days: config.output.log_retention_days,
    };

    let app_service =
        service::build_app_service(&mut stack, &config.app, &placement, &entry, &image)?;

    let storage = storage::build_storage(&mut stack, &config.storage, &network, &security)?;
    let database_service = service::build_database_service(
        &mut stack,
        &config.database,
        &config.storage,
        &placement,
        &storage,
    )?;

    stack.add_output(Output {
        name: "url".to_string(),
        description: "The URL at which the application's HTTP endpoint is available".to_string(),
        prefix: "http://".to_string(),
        reference: Reference::new(&entry.load_balancer, Attribute::DnsName),
    });

    info!(
        stack = %stack.name,
        resources = stack.len(),
        image_tag,
        "declared stack"
    );

    Ok(Topology {
        stack,
        network,
        security,
        image,
        storage,
        app_service,
        database_service,
    })
}
