use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::reference::Reference;

/// A declared resource: a named, typed node in the resource graph
#[derive(Debug, Clone)]
pub struct Resource {
    /// Declared name, unique within a stack (e.g. `efs-mount-target-2`)
    pub name: String,
    pub kind: ResourceKind,
    /// Ordering edges that are not expressed through attribute references
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Resource {
            name: name.into(),
            kind,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Every attribute reference this resource reads
    pub fn references(&self) -> Vec<&Reference> {
        self.kind.references()
    }
}

#[derive(Debug, Clone)]
pub enum ResourceKind {
    Vpc(Vpc),
    InternetGateway,
    GatewayAttachment(GatewayAttachment),
    Subnet(Subnet),
    RouteTable(RouteTable),
    Route(Route),
    RouteTableAssociation(RouteTableAssociation),
    ElasticIp,
    NatGateway(NatGateway),
    SecurityGroup(SecurityGroup),
    SecurityGroupRule(SecurityGroupRule),
    Namespace(PrivateDnsNamespace),
    Cluster(Cluster),
    LoadBalancer(LoadBalancer),
    TargetGroup(TargetGroup),
    Listener(Listener),
    Repository(Repository),
    Image(ImageBuild),
    ExecutionRole(ExecutionRole),
    LogGroup(LogGroup),
    TaskDefinition(TaskDefinition),
    Service(Service),
    FileSystem(FileSystem),
    MountTarget(MountTarget),
    AccessPoint(AccessPoint),
}

impl ResourceKind {
    /// Engine resource type, e.g. `AWS::EC2::VPC`
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Vpc(_) => "AWS::EC2::VPC",
            ResourceKind::InternetGateway => "AWS::EC2::InternetGateway",
            ResourceKind::GatewayAttachment(_) => "AWS::EC2::VPCGatewayAttachment",
            ResourceKind::Subnet(_) => "AWS::EC2::Subnet",
            ResourceKind::RouteTable(_) => "AWS::EC2::RouteTable",
            ResourceKind::Route(_) => "AWS::EC2::Route",
            ResourceKind::RouteTableAssociation(_) => "AWS::EC2::SubnetRouteTableAssociation",
            ResourceKind::ElasticIp => "AWS::EC2::EIP",
            ResourceKind::NatGateway(_) => "AWS::EC2::NatGateway",
            ResourceKind::SecurityGroup(_) => "AWS::EC2::SecurityGroup",
            ResourceKind::SecurityGroupRule(rule) => match rule.direction {
                Direction::Ingress => "AWS::EC2::SecurityGroupIngress",
                Direction::Egress => "AWS::EC2::SecurityGroupEgress",
            },
            ResourceKind::Namespace(_) => "AWS::ServiceDiscovery::PrivateDnsNamespace",
            ResourceKind::Cluster(_) => "AWS::ECS::Cluster",
            ResourceKind::LoadBalancer(_) => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            ResourceKind::TargetGroup(_) => "AWS::ElasticLoadBalancingV2::TargetGroup",
            ResourceKind::Listener(_) => "AWS::ElasticLoadBalancingV2::Listener",
            ResourceKind::Repository(_) => "AWS::ECR::Repository",
            ResourceKind::Image(_) => "Novella::Container::Image",
            ResourceKind::ExecutionRole(_) => "AWS::IAM::Role",
            ResourceKind::LogGroup(_) => "AWS::Logs::LogGroup",
            ResourceKind::TaskDefinition(_) => "AWS::ECS::TaskDefinition",
            ResourceKind::Service(_) => "AWS::ECS::Service",
            ResourceKind::FileSystem(_) => "AWS::EFS::FileSystem",
            ResourceKind::MountTarget(_) => "AWS::EFS::MountTarget",
            ResourceKind::AccessPoint(_) => "AWS::EFS::AccessPoint",
        }
    }

    /// Whether the provisioning engine creates this resource. Image builds
    /// are performed by an external build step and only recorded as metadata.
    pub fn is_provisioned(&self) -> bool {
        !matches!(self, ResourceKind::Image(_))
    }

    pub fn references(&self) -> Vec<&Reference> {
        match self {
            ResourceKind::Vpc(_)
            | ResourceKind::InternetGateway
            | ResourceKind::ElasticIp
            | ResourceKind::Cluster(_)
            | ResourceKind::ExecutionRole(_)
            | ResourceKind::LogGroup(_)
            | ResourceKind::FileSystem(_)
            | ResourceKind::Repository(_) => Vec::new(),
            ResourceKind::GatewayAttachment(a) => vec![&a.vpc, &a.gateway],
            ResourceKind::Subnet(s) => vec![&s.vpc],
            ResourceKind::RouteTable(t) => vec![&t.vpc],
            ResourceKind::Route(r) => vec![&r.route_table, r.target.reference()],
            ResourceKind::RouteTableAssociation(a) => vec![&a.route_table, &a.subnet],
            ResourceKind::NatGateway(n) => vec![&n.subnet, &n.allocation],
            ResourceKind::SecurityGroup(g) => vec![&g.vpc],
            ResourceKind::SecurityGroupRule(rule) => {
                let mut refs = vec![&rule.group];
                if let Peer::Group(peer) = &rule.peer {
                    refs.push(peer);
                }
                refs
            }
            ResourceKind::Namespace(ns) => vec![&ns.vpc],
            ResourceKind::LoadBalancer(lb) => {
                lb.subnets.iter().chain(lb.security_groups.iter()).collect()
            }
            ResourceKind::TargetGroup(tg) => vec![&tg.vpc],
            ResourceKind::Listener(l) => vec![&l.load_balancer, &l.target_group],
            ResourceKind::Image(image) => vec![&image.repository],
            ResourceKind::TaskDefinition(td) => {
                let mut refs = vec![&td.execution_role];
                for container in &td.containers {
                    if let ImageSource::Built(image) = &container.image {
                        refs.push(image);
                    }
                    refs.push(&container.log_group);
                }
                for volume in &td.volumes {
                    refs.push(&volume.efs.file_system);
                    if let Some(ap) = &volume.efs.access_point {
                        refs.push(ap);
                    }
                }
                refs
            }
            ResourceKind::Service(svc) => {
                let mut refs = vec![&svc.cluster, &svc.task_definition];
                refs.extend(svc.subnets.iter());
                refs.extend(svc.security_groups.iter());
                if let Some(sc) = &svc.service_connect {
                    refs.push(&sc.namespace);
                }
                refs.extend(svc.load_balancers.iter().map(|lb| &lb.target_group));
                refs
            }
            ResourceKind::MountTarget(mt) => {
                let mut refs = vec![&mt.file_system, &mt.subnet];
                refs.extend(mt.security_groups.iter());
                refs
            }
            ResourceKind::AccessPoint(ap) => vec![&ap.file_system],
        }
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayAttachment {
    pub vpc: Reference,
    pub gateway: Reference,
}

/// Reachability class of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    /// Internet-routable
    Public,
    /// Egress through NAT only
    Private,
    /// No route to the internet
    Isolated,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetTier::Public => "public",
            SubnetTier::Private => "private",
            SubnetTier::Isolated => "isolated",
        }
    }
}

/// Availability zone placement: a literal zone name, or the n-th zone of the
/// deployment region resolved by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityZone {
    Named(String),
    Index(u32),
}

#[derive(Debug, Clone)]
pub struct Subnet {
    pub vpc: Reference,
    pub cidr_block: String,
    pub availability_zone: AvailabilityZone,
    pub tier: SubnetTier,
    pub map_public_ip_on_launch: bool,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    pub vpc: Reference,
}

#[derive(Debug, Clone)]
pub enum RouteTarget {
    InternetGateway(Reference),
    NatGateway(Reference),
}

impl RouteTarget {
    pub fn reference(&self) -> &Reference {
        match self {
            RouteTarget::InternetGateway(r) | RouteTarget::NatGateway(r) => r,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub route_table: Reference,
    pub destination: String,
    pub target: RouteTarget,
}

#[derive(Debug, Clone)]
pub struct RouteTableAssociation {
    pub route_table: Reference,
    pub subnet: Reference,
}

#[derive(Debug, Clone)]
pub struct NatGateway {
    pub subnet: Reference,
    pub allocation: Reference,
}

// ---------------------------------------------------------------------------
// Security
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub vpc: Reference,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    All,
    Tcp,
}

impl Protocol {
    /// Protocol string as the EC2 API spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::All => "-1",
            Protocol::Tcp => "tcp",
        }
    }
}

/// The other side of a security group rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Cidr(String),
    Group(Reference),
}

impl Peer {
    pub fn is_anywhere(&self) -> bool {
        matches!(self, Peer::Cidr(cidr) if cidr == "0.0.0.0/0")
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroupRule {
    pub group: Reference,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Inclusive port range; `None` for all-protocol rules
    pub ports: Option<(u16, u16)>,
    pub peer: Peer,
}

// ---------------------------------------------------------------------------
// Discovery, compute and entry point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PrivateDnsNamespace {
    pub name: String,
    pub description: String,
    pub vpc: Reference,
}

#[derive(Debug, Clone, Default)]
pub struct Cluster {
    pub container_insights: bool,
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub internet_facing: bool,
    pub subnets: Vec<Reference>,
    pub security_groups: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHealthCheck {
    pub path: String,
    pub interval: u32,
    pub timeout: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub vpc: Reference,
    pub port: u16,
    pub deregistration_delay: u32,
    pub health_check: TargetHealthCheck,
}

#[derive(Debug, Clone)]
pub struct Listener {
    pub load_balancer: Reference,
    pub port: u16,
    pub target_group: Reference,
}

// ---------------------------------------------------------------------------
// Image pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Repository {
    pub immutable_tags: bool,
    pub force_delete: bool,
}

/// Build-and-push step for a container image. Performed outside the
/// provisioning engine; the graph only records its inputs and result tag.
#[derive(Debug, Clone)]
pub struct ImageBuild {
    pub repository: Reference,
    pub context: PathBuf,
    pub platform: String,
    pub tag: String,
}

// ---------------------------------------------------------------------------
// Workloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionRole {
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LogGroup {
    pub retention_days: u32,
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Image produced by an [`ImageBuild`] node
    Built(Reference),
    /// Public or external image, e.g. `postgres:latest`
    Registry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub name: String,
    pub container_port: u16,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHealthCheck {
    /// Command in ECS form, e.g. `["CMD-SHELL", "pg_isready -U postgres"]`
    pub command: Vec<String>,
    pub interval: u32,
    pub timeout: u32,
    pub retries: u32,
    pub start_period: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub source_volume: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: ImageSource,
    pub cpu: u32,
    pub memory: u32,
    pub essential: bool,
    pub port_mappings: Vec<PortMapping>,
    /// Plain environment variables
    pub environment: BTreeMap<String, String>,
    /// Environment variables resolved from an external secret store:
    /// variable name -> parameter name or ARN
    pub secrets: BTreeMap<String, String>,
    pub health_check: Option<ContainerHealthCheck>,
    pub mount_points: Vec<MountPoint>,
    pub log_group: Reference,
}

#[derive(Debug, Clone)]
pub struct EfsVolume {
    pub file_system: Reference,
    pub transit_encryption: bool,
    pub access_point: Option<Reference>,
    pub iam_authorization: bool,
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub name: String,
    pub efs: EfsVolume,
}

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub family: String,
    pub cpu: u32,
    pub memory: u32,
    pub execution_role: Reference,
    pub containers: Vec<ContainerDefinition>,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    pub enable: bool,
    pub rollback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAlias {
    pub dns_name: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ServiceConnectService {
    pub port_name: String,
    pub discovery_name: String,
    pub client_aliases: Vec<ClientAlias>,
}

#[derive(Debug, Clone)]
pub struct ServiceConnect {
    pub namespace: Reference,
    pub services: Vec<ServiceConnectService>,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerAttachment {
    pub target_group: Reference,
    pub container_name: String,
    pub container_port: u16,
}

/// Who is meant to reach a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    /// Reachable from the internet through the load balancer
    LoadBalanced,
    /// Reachable only inside the network via service discovery
    Internal,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub cluster: Reference,
    pub task_definition: Reference,
    pub desired_count: u32,
    pub subnets: Vec<Reference>,
    pub security_groups: Vec<Reference>,
    pub assign_public_ip: bool,
    pub circuit_breaker: Option<CircuitBreaker>,
    pub service_connect: Option<ServiceConnect>,
    pub load_balancers: Vec<LoadBalancerAttachment>,
    pub exposure: Exposure,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSystem {
    pub encrypted: bool,
}

#[derive(Debug, Clone)]
pub struct MountTarget {
    pub file_system: Reference,
    pub subnet: Reference,
    pub security_groups: Vec<Reference>,
}

#[derive(Debug, Clone)]
pub struct AccessPoint {
    pub file_system: Reference,
}
