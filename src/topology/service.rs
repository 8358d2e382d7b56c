//! Fargate workloads: log group, task definition and ECS service per workload.

use anyhow::Result;
use tracing::debug;

use crate::config::{AppConfig, CircuitBreakerConfig, DatabaseConfig, StorageConfig};
use crate::models::{
    CircuitBreaker, ContainerDefinition, ContainerHealthCheck, EfsVolume, Exposure, ImageSource,
    LoadBalancerAttachment, LogGroup, MountPoint, PortMapping, Reference, Resource, ResourceKind,
    Service, ServiceConnect, Stack, SubnetTier, TaskDefinition, Volume,
};
use crate::utils::fargate_task_size;

use super::discovery::registration;
use super::load_balancer::EntryPoint;
use super::network::Network;
use super::registry::ImagePipeline;
use super::security::SecurityGroups;
use super::storage::Storage;

/// Resources every workload attaches to
pub struct Placement<'a> {
    pub cluster: &'a str,
    pub namespace: &'a str,
    pub execution_role: &'a str,
    pub network: &'a Network,
    pub security: &'a SecurityGroups,
    pub log_retention_days: u32,
}

/// One Fargate service before it is declared
struct Workload {
    name: String,
    containers: Vec<ContainerDefinition>,
    volumes: Vec<Volume>,
    desired_count: u32,
    circuit_breaker: Option<CircuitBreaker>,
    service_connect: ServiceConnect,
    load_balancers: Vec<LoadBalancerAttachment>,
    exposure: Exposure,
    depends_on: Vec<String>,
}

fn log_group_name(service: &str) -> String {
    format!("{}-logs", service)
}

fn circuit_breaker(config: Option<CircuitBreakerConfig>) -> Option<CircuitBreaker> {
    config.map(|cb| CircuitBreaker {
        enable: cb.enable,
        rollback: cb.rollback,
    })
}

/// Declare log group, task definition and service for one workload.
/// Returns the service name.
fn declare(stack: &mut Stack, placement: &Placement<'_>, workload: Workload) -> Result<String> {
    let log_group = log_group_name(&workload.name);
    let task_definition = format!("{}-task", workload.name);

    let cpu: u32 = workload.containers.iter().map(|c| c.cpu).sum();
    let memory: u32 = workload.containers.iter().map(|c| c.memory).sum();
    let (task_cpu, task_memory) = fargate_task_size(cpu, memory).ok_or_else(|| {
        anyhow::anyhow!(
            "No Fargate task size fits {} (cpu={}, memory={})",
            workload.name,
            cpu,
            memory
        )
    })?;
    debug!(
        service = %workload.name,
        container_cpu = cpu,
        container_memory = memory,
        task_cpu,
        task_memory,
        "sized task"
    );

    stack.add(Resource::new(
        log_group.clone(),
        ResourceKind::LogGroup(LogGroup {
            retention_days: placement.log_retention_days,
        }),
    ))?;

    stack.add(Resource::new(
        task_definition.clone(),
        ResourceKind::TaskDefinition(TaskDefinition {
            family: workload.name.clone(),
            cpu: task_cpu,
            memory: task_memory,
            execution_role: Reference::arn(placement.execution_role),
            containers: workload.containers,
            volumes: workload.volumes,
        }),
    ))?;

    let mut service = Resource::new(
        workload.name.clone(),
        ResourceKind::Service(Service {
            cluster: Reference::arn(placement.cluster),
            task_definition: Reference::id(&task_definition),
            desired_count: workload.desired_count,
            subnets: placement.network.subnet_refs(SubnetTier::Private),
            security_groups: vec![Reference::id(&placement.security.internal)],
            assign_public_ip: false,
            circuit_breaker: workload.circuit_breaker,
            service_connect: Some(workload.service_connect),
            load_balancers: workload.load_balancers,
            exposure: workload.exposure,
        }),
    );
    for dependency in workload.depends_on {
        service = service.depends_on(dependency);
    }
    stack.add(service)?;

    Ok(workload.name)
}

/// The internet-facing application, served through the load balancer
pub fn build_app_service(
    stack: &mut Stack,
    config: &AppConfig,
    placement: &Placement<'_>,
    entry: &EntryPoint,
    image: &ImagePipeline,
) -> Result<String> {
    let name = format!("{}-service", config.name);

    let container = ContainerDefinition {
        name: config.name.clone(),
        image: ImageSource::Built(image.image_uri()),
        cpu: config.cpu,
        memory: config.memory,
        essential: true,
        port_mappings: vec![PortMapping {
            name: config.port_name.clone(),
            container_port: config.container_port,
            host_port: config.container_port,
        }],
        environment: config.environment.clone(),
        secrets: config.secrets.clone(),
        health_check: None,
        mount_points: Vec::new(),
        log_group: Reference::id(log_group_name(&name)),
    };

    declare(
        stack,
        placement,
        Workload {
            name: name.clone(),
            containers: vec![container],
            volumes: Vec::new(),
            desired_count: config.desired_count,
            circuit_breaker: circuit_breaker(config.circuit_breaker),
            service_connect: registration(
                placement.namespace,
                &config.discovery_name,
                &config.port_name,
                config.container_port,
            ),
            load_balancers: vec![LoadBalancerAttachment {
                target_group: Reference::id(&entry.target_group),
                container_name: config.name.clone(),
                container_port: config.container_port,
            }],
            exposure: Exposure::LoadBalanced,
            // the target group must be attached to a listener first
            depends_on: vec![entry.listener.clone()],
        },
    )
}

/// The database, reachable only through service discovery and backed by EFS
pub fn build_database_service(
    stack: &mut Stack,
    config: &DatabaseConfig,
    storage_config: &StorageConfig,
    placement: &Placement<'_>,
    storage: &Storage,
) -> Result<String> {
    let name = format!("{}-service", config.name);
    let hc = &config.health_check;

    let container = ContainerDefinition {
        name: config.name.clone(),
        image: ImageSource::Registry(config.image.clone()),
        cpu: config.cpu,
        memory: config.memory,
        essential: true,
        port_mappings: vec![PortMapping {
            name: config.port_name.clone(),
            container_port: config.port,
            host_port: config.port,
        }],
        environment: config.environment.clone(),
        secrets: config.secrets.clone(),
        health_check: Some(ContainerHealthCheck {
            command: vec!["CMD-SHELL".to_string(), hc.command.clone()],
            interval: hc.interval,
            timeout: hc.timeout,
            retries: hc.retries,
            start_period: hc.start_period,
        }),
        mount_points: vec![MountPoint {
            source_volume: config.volume_name.clone(),
            container_path: config.data_dir.clone(),
            read_only: false,
        }],
        log_group: Reference::id(log_group_name(&name)),
    };

    let volume = Volume {
        name: config.volume_name.clone(),
        efs: EfsVolume {
            file_system: Reference::id(&storage.file_system),
            transit_encryption: storage_config.transit_encryption,
            access_point: Some(Reference::id(&storage.access_point)),
            iam_authorization: storage_config.iam_authorization,
        },
    };

    declare(
        stack,
        placement,
        Workload {
            name,
            containers: vec![container],
            volumes: vec![volume],
            desired_count: config.desired_count,
            circuit_breaker: circuit_breaker(config.circuit_breaker),
            service_connect: registration(
                placement.namespace,
                &config.discovery_name,
                &config.port_name,
                config.port,
            ),
            load_balancers: Vec::new(),
            exposure: Exposure::Internal,
            // tasks cannot mount the volume before the mount targets exist
            depends_on: storage.mount_targets.clone(),
        },
    )
}

