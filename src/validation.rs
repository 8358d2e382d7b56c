//! Plan validation for security and correctness.
//!
//! Runs over a declared topology before anything is rendered:
//! - Workloads stay in private subnets without public addresses
//! - Health checks are within the ranges the engine accepts
//! - The file system is reachable from every private subnet over NFS only
//! - Secrets are not carried as plain environment values
//! - The stack output and logical IDs are well formed

use std::collections::HashSet;

use crate::generator::GeneratorContext;
use crate::models::{
    Attribute, Direction, Exposure, ImageSource, Peer, Protocol, ResourceKind, Stack, SubnetTier,
};
use crate::topology::Topology;
use crate::utils::is_valid_fargate_size;

// ============================================================================
// Validation Result Types
// ============================================================================

/// Findings of one validation run
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Findings that block rendering
    pub errors: Vec<ValidationError>,
    /// Findings that are reported but do not block rendering
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A workload is placed in a subnet that is not private or isolated
    WorkloadInPublicSubnet { service: String, subnet: String },
    /// A workload asks for a public IP address
    PublicIpAssigned { service: String },
    /// An internal-only workload is attached to a load balancer
    InternalWorkloadExposed { service: String },
    InvalidTargetHealthCheck { target_group: String, reason: String },
    /// A private subnet has zero or several mount targets for a file system
    MountTargetCoverage {
        file_system: String,
        subnet: String,
        count: usize,
    },
    /// A mount-target group admits something other than NFS from workloads
    MountTargetIngress { group: String, reason: String },
    /// An environment variable looks like it carries a credential
    PlaintextSecret { container: String, variable: String },
    InvalidOutput { output: String, reason: String },
    LogicalIdCollision { logical_id: String, names: Vec<String> },
    InvalidTaskSize {
        task_definition: String,
        cpu: u32,
        memory: u32,
        reason: String,
    },
    InvalidContainerHealthCheck { container: String, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::WorkloadInPublicSubnet { service, subnet } => write!(
                f,
                "[E001] Service '{}' is placed in '{}', which is not a private subnet",
                service, subnet
            ),
            ValidationError::PublicIpAssigned { service } => write!(
                f,
                "[E002] Service '{}' assigns public IP addresses to its tasks",
                service
            ),
            ValidationError::InternalWorkloadExposed { service } => write!(
                f,
                "[E003] Service '{}' is internal-only but attached to a load balancer",
                service
            ),
            ValidationError::InvalidTargetHealthCheck {
                target_group,
                reason,
            } => write!(
                f,
                "[E004] Target group '{}' has an invalid health check: {}",
                target_group, reason
            ),
            ValidationError::MountTargetCoverage {
                file_system,
                subnet,
                count,
            } => write!(
                f,
                "[E005] File system '{}' has {} mount targets in private subnet '{}', \
                 expected exactly one",
                file_system, count, subnet
            ),
            ValidationError::MountTargetIngress { group, reason } => write!(
                f,
                "[E006] Mount-target group '{}': {}",
                group, reason
            ),
            ValidationError::PlaintextSecret {
                container,
                variable,
            } => write!(
                f,
                "[E007] Container '{}' sets '{}' as a plain environment value; move it to secrets",
                container, variable
            ),
            ValidationError::InvalidOutput { output, reason } => {
                write!(f, "[E008] Output '{}' is malformed: {}", output, reason)
            }
            ValidationError::LogicalIdCollision { logical_id, names } => write!(
                f,
                "[E009] Logical ID '{}' is claimed by several resources: {}",
                logical_id,
                names.join(", ")
            ),
            ValidationError::InvalidTaskSize {
                task_definition,
                cpu,
                memory,
                reason,
            } => write!(
                f,
                "[E010] Task definition '{}' (cpu={}, memory={}): {}",
                task_definition, cpu, memory, reason
            ),
            ValidationError::InvalidContainerHealthCheck { container, reason } => write!(
                f,
                "[E011] Container '{}' has an invalid health check: {}",
                container, reason
            ),
        }
    }
}

// ============================================================================
// Validation Warnings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Ingress from anywhere lands on a group that workloads use
    PublicIngressOnWorkloadGroup { rule: String, group: String },
    /// The circuit breaker stops a failing deployment but leaves it in place
    RollbackDisabled { service: String },
    CircuitBreakerMissing { service: String },
    /// The image reference can change underneath the deployment
    MutableImageTag { container: String, image: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::PublicIngressOnWorkloadGroup { rule, group } => write!(
                f,
                "[W001] Rule '{}' admits traffic from anywhere into '{}', which workloads share",
                rule, group
            ),
            ValidationWarning::RollbackDisabled { service } => write!(
                f,
                "[W002] Service '{}' does not roll back failed deployments",
                service
            ),
            ValidationWarning::CircuitBreakerMissing { service } => write!(
                f,
                "[W003] Service '{}' has no deployment circuit breaker",
                service
            ),
            ValidationWarning::MutableImageTag { container, image } => write!(
                f,
                "[W004] Container '{}' uses mutable image '{}'",
                container, image
            ),
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Validate a declared topology. `ctx` must have the stack registered.
pub fn validate_topology(topology: &Topology, ctx: &GeneratorContext) -> ValidationResult {
    let mut result = ValidationResult::default();
    let stack = &topology.stack;

    // Phase 1: workload placement
    validate_placement(stack, &mut result);

    // Phase 2: health checks and task sizes
    validate_health_checks(stack, &mut result);
    validate_task_sizes(stack, &mut result);

    // Phase 3: storage reachability
    validate_storage(stack, topology.storage.nfs_port, &mut result);

    // Phase 4: network exposure and secrets
    validate_security(stack, &mut result);

    // Phase 5: deployment safety
    validate_deployments(stack, &mut result);

    // Phase 6: outputs and naming
    validate_outputs(stack, &mut result);
    for (logical_id, names) in ctx.collisions() {
        result
            .errors
            .push(ValidationError::LogicalIdCollision { logical_id, names });
    }

    result
}

// ============================================================================
// Phase 1: Placement
// ============================================================================

fn subnet_tier(stack: &Stack, name: &str) -> Option<SubnetTier> {
    match stack.get(name).map(|r| &r.kind) {
        Some(ResourceKind::Subnet(subnet)) => Some(subnet.tier),
        _ => None,
    }
}

fn validate_placement(stack: &Stack, result: &mut ValidationResult) {
    let services = stack.filter(|k| match k {
        ResourceKind::Service(s) => Some(s),
        _ => None,
    });

    for (name, service) in services {
        for subnet in &service.subnets {
            match subnet_tier(stack, &subnet.target) {
                Some(SubnetTier::Private) | Some(SubnetTier::Isolated) => {}
                _ => result.errors.push(ValidationError::WorkloadInPublicSubnet {
                    service: name.to_string(),
                    subnet: subnet.target.clone(),
                }),
            }
        }

        if service.assign_public_ip {
            result.errors.push(ValidationError::PublicIpAssigned {
                service: name.to_string(),
            });
        }

        if service.exposure == Exposure::Internal && !service.load_balancers.is_empty() {
            result.errors.push(ValidationError::InternalWorkloadExposed {
                service: name.to_string(),
            });
        }
    }
}

// ============================================================================
// Phase 2: Health Checks and Sizing
// ============================================================================

fn validate_health_checks(stack: &Stack, result: &mut ValidationResult) {
    let target_groups = stack.filter(|k| match k {
        ResourceKind::TargetGroup(tg) => Some(tg),
        _ => None,
    });
    for (name, tg) in target_groups {
        let hc = &tg.health_check;
        let mut reasons = Vec::new();
        if !hc.path.starts_with('/') {
            reasons.push(format!("path '{}' must start with '/'", hc.path));
        }
        for (label, value) in [
            ("healthy threshold", hc.healthy_threshold),
            ("unhealthy threshold", hc.unhealthy_threshold),
        ] {
            if !(2..=10).contains(&value) {
                reasons.push(format!("{} {} is outside 2..=10", label, value));
            }
        }
        if hc.timeout >= hc.interval {
            reasons.push(format!(
                "timeout {}s must be below interval {}s",
                hc.timeout, hc.interval
            ));
        }
        for reason in reasons {
            result.errors.push(ValidationError::InvalidTargetHealthCheck {
                target_group: name.to_string(),
                reason,
            });
        }
    }

    let task_definitions = stack.filter(|k| match k {
        ResourceKind::TaskDefinition(td) => Some(td),
        _ => None,
    });
    for (_, td) in task_definitions {
        for container in &td.containers {
            let Some(hc) = &container.health_check else {
                continue;
            };
            let mut reasons = Vec::new();
            if hc.command.len() < 2 {
                reasons.push("command is empty".to_string());
            }
            if !(5..=300).contains(&hc.interval) {
                reasons.push(format!("interval {}s is outside 5..=300", hc.interval));
            }
            if !(2..=60).contains(&hc.timeout) || hc.timeout >= hc.interval {
                reasons.push(format!(
                    "timeout {}s must be within 2..=60 and below the interval",
                    hc.timeout
                ));
            }
            if !(1..=10).contains(&hc.retries) {
                reasons.push(format!("retries {} is outside 1..=10", hc.retries));
            }
            if hc.start_period > 300 {
                reasons.push(format!("start period {}s exceeds 300", hc.start_period));
            }
            for reason in reasons {
                result.errors.push(ValidationError::InvalidContainerHealthCheck {
                    container: container.name.clone(),
                    reason,
                });
            }
        }
    }
}

fn validate_task_sizes(stack: &Stack, result: &mut ValidationResult) {
    let task_definitions = stack.filter(|k| match k {
        ResourceKind::TaskDefinition(td) => Some(td),
        _ => None,
    });

    for (name, td) in task_definitions {
        let invalid = |reason: String| ValidationError::InvalidTaskSize {
            task_definition: name.to_string(),
            cpu: td.cpu,
            memory: td.memory,
            reason,
        };

        if !is_valid_fargate_size(td.cpu, td.memory) {
            result
                .errors
                .push(invalid("not a valid Fargate size".to_string()));
        }

        let cpu: u32 = td.containers.iter().map(|c| c.cpu).sum();
        let memory: u32 = td.containers.iter().map(|c| c.memory).sum();
        if cpu > td.cpu || memory > td.memory {
            result.errors.push(invalid(format!(
                "containers need cpu={} memory={}",
                cpu, memory
            )));
        }
    }
}

// ============================================================================
// Phase 3: Storage
// ============================================================================

fn validate_storage(stack: &Stack, nfs_port: u16, result: &mut ValidationResult) {
    let private_subnets: Vec<&str> = stack
        .filter(|k| match k {
            ResourceKind::Subnet(s) => Some(s),
            _ => None,
        })
        .filter(|(_, s)| s.tier == SubnetTier::Private)
        .map(|(name, _)| name)
        .collect();

    let mount_targets: Vec<_> = stack
        .filter(|k| match k {
            ResourceKind::MountTarget(mt) => Some(mt),
            _ => None,
        })
        .collect();

    let file_systems = stack.filter(|k| match k {
        ResourceKind::FileSystem(fs) => Some(fs),
        _ => None,
    });
    for (fs_name, _) in file_systems {
        for subnet in &private_subnets {
            let count = mount_targets
                .iter()
                .filter(|(_, mt)| mt.file_system.target == fs_name && mt.subnet.target == *subnet)
                .count();
            if count != 1 {
                result.errors.push(ValidationError::MountTargetCoverage {
                    file_system: fs_name.to_string(),
                    subnet: subnet.to_string(),
                    count,
                });
            }
        }
    }

    let workload_groups = workload_groups(stack);
    let mount_groups: HashSet<&str> = mount_targets
        .iter()
        .flat_map(|(_, mt)| mt.security_groups.iter().map(|g| g.target.as_str()))
        .collect();
    let mut mount_groups: Vec<&str> = mount_groups.into_iter().collect();
    mount_groups.sort_unstable();

    for group in mount_groups {
        let ingress: Vec<_> = stack
            .filter(|k| match k {
                ResourceKind::SecurityGroupRule(rule) => Some(rule),
                _ => None,
            })
            .filter(|(_, rule)| rule.group.target == group && rule.direction == Direction::Ingress)
            .collect();

        if ingress.is_empty() {
            result.errors.push(ValidationError::MountTargetIngress {
                group: group.to_string(),
                reason: format!("no ingress on TCP/{}", nfs_port),
            });
        }

        for (rule_name, rule) in ingress {
            let nfs_only =
                rule.protocol == Protocol::Tcp && rule.ports == Some((nfs_port, nfs_port));
            let from_workloads = matches!(
                &rule.peer,
                Peer::Group(peer) if workload_groups.contains(peer.target.as_str())
            );
            if !nfs_only || !from_workloads {
                result.errors.push(ValidationError::MountTargetIngress {
                    group: group.to_string(),
                    reason: format!(
                        "rule '{}' must admit only TCP/{} from the workload group",
                        rule_name, nfs_port
                    ),
                });
            }
        }
    }
}

/// Security groups attached to any service
fn workload_groups(stack: &Stack) -> HashSet<&str> {
    stack
        .filter(|k| match k {
            ResourceKind::Service(s) => Some(s),
            _ => None,
        })
        .flat_map(|(_, s)| s.security_groups.iter().map(|g| g.target.as_str()))
        .collect()
}

// ============================================================================
// Phase 4: Exposure and Secrets
// ============================================================================

const SECRET_MARKERS: [&str; 6] = [
    "PASSWORD",
    "SECRET",
    "TOKEN",
    "API_KEY",
    "PRIVATE_KEY",
    "DATABASE_URL",
];

/// Whether an environment entry looks like it carries a credential
fn looks_like_secret(name: &str, value: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    if SECRET_MARKERS.iter().any(|m| upper.contains(m)) {
        return true;
    }
    // user:password@host in a connection string
    match value.split_once("://") {
        Some((_, rest)) => rest
            .split('/')
            .next()
            .is_some_and(|authority| authority.contains('@') && authority.contains(':')),
        None => false,
    }
}

fn validate_security(stack: &Stack, result: &mut ValidationResult) {
    let workload_groups = workload_groups(stack);

    let rules = stack.filter(|k| match k {
        ResourceKind::SecurityGroupRule(rule) => Some(rule),
        _ => None,
    });
    for (name, rule) in rules {
        if rule.direction == Direction::Ingress
            && rule.peer.is_anywhere()
            && workload_groups.contains(rule.group.target.as_str())
        {
            result
                .warnings
                .push(ValidationWarning::PublicIngressOnWorkloadGroup {
                    rule: name.to_string(),
                    group: rule.group.target.clone(),
                });
        }
    }

    let task_definitions = stack.filter(|k| match k {
        ResourceKind::TaskDefinition(td) => Some(td),
        _ => None,
    });
    for (_, td) in task_definitions {
        for container in &td.containers {
            for (variable, value) in &container.environment {
                if looks_like_secret(variable, value) {
                    result.errors.push(ValidationError::PlaintextSecret {
                        container: container.name.clone(),
                        variable: variable.clone(),
                    });
                }
            }
        }
    }
}

// ============================================================================
// Phase 5: Deployments
// ============================================================================

/// `postgres`, `postgres:latest` and the like can move; digests and other
/// tags are treated as pinned
fn is_mutable_image(image: &str) -> bool {
    if image.contains('@') {
        return false;
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.split_once(':') {
        Some((_, tag)) => tag == "latest",
        None => true,
    }
}

fn validate_deployments(stack: &Stack, result: &mut ValidationResult) {
    let services = stack.filter(|k| match k {
        ResourceKind::Service(s) => Some(s),
        _ => None,
    });
    for (name, service) in services {
        match service.circuit_breaker {
            Some(cb) if cb.enable && !cb.rollback => {
                result.warnings.push(ValidationWarning::RollbackDisabled {
                    service: name.to_string(),
                })
            }
            Some(cb) if cb.enable => {}
            _ => result.warnings.push(ValidationWarning::CircuitBreakerMissing {
                service: name.to_string(),
            }),
        }
    }

    let task_definitions = stack.filter(|k| match k {
        ResourceKind::TaskDefinition(td) => Some(td),
        _ => None,
    });
    for (_, td) in task_definitions {
        for container in &td.containers {
            if let ImageSource::Registry(image) = &container.image {
                if is_mutable_image(image) {
                    result.warnings.push(ValidationWarning::MutableImageTag {
                        container: container.name.clone(),
                        image: image.clone(),
                    });
                }
            }
        }
    }
}

// ============================================================================
// Phase 6: Outputs
// ============================================================================

fn validate_outputs(stack: &Stack, result: &mut ValidationResult) {
    if stack.outputs.is_empty() {
        result.errors.push(ValidationError::InvalidOutput {
            output: "url".to_string(),
            reason: "stack exports no URL".to_string(),
        });
    }

    for output in &stack.outputs {
        let mut invalid = |reason: String| {
            result.errors.push(ValidationError::InvalidOutput {
                output: output.name.clone(),
                reason,
            })
        };

        if output.prefix != "http://" {
            invalid(format!("prefix '{}' is not 'http://'", output.prefix));
        }
        let target = stack.get(&output.reference.target).map(|r| &r.kind);
        if !matches!(target, Some(ResourceKind::LoadBalancer(_)))
            || output.reference.attribute != Attribute::DnsName
        {
            invalid(format!(
                "'{}' is not the DNS name of a load balancer",
                output.reference
            ));
        }
    }
}
