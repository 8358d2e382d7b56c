//! CloudFormation-format template rendering

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use crate::models::{
    Attribute, AvailabilityZone, ContainerDefinition, Direction, ImageBuild, ImageSource, Output,
    Peer, Reference, Resource, ResourceKind, RouteTarget, Stack, TaskDefinition,
};
use crate::resolver::ResourceGraph;

use super::GeneratorContext;

const TEMPLATE_VERSION: &str = "2010-09-09";
/// Metadata key listing the image builds the template expects to exist
pub const IMAGE_METADATA_KEY: &str = "Novella::ImageBuilds";

/// Render the stack as a template document
pub fn generate_template(
    stack: &Stack,
    graph: &ResourceGraph,
    ctx: &GeneratorContext,
) -> Result<Value> {
    let mut resources = Map::new();
    let mut images = Vec::new();

    for name in graph.order() {
        let resource = stack
            .get(name)
            .with_context(|| format!("Resource '{}' missing from stack", name))?;

        if let ResourceKind::Image(image) = &resource.kind {
            images.push(image_metadata(name, image, ctx));
            continue;
        }

        let properties = render_properties(resource, stack, ctx)?;
        let mut entry = Map::new();
        entry.insert("Type".to_string(), json!(resource.kind.type_name()));
        if !resource.depends_on.is_empty() {
            let depends: Vec<String> = resource
                .depends_on
                .iter()
                .map(|d| ctx.logical_id(d))
                .collect();
            entry.insert("DependsOn".to_string(), json!(depends));
        }
        if !properties.as_object().map_or(true, Map::is_empty) {
            entry.insert("Properties".to_string(), properties);
        }
        resources.insert(ctx.logical_id(name), Value::Object(entry));
    }

    let mut outputs = Map::new();
    for output in &stack.outputs {
        outputs.insert(
            ctx.format_logical_id(&output.name),
            json!({
                "Description": output.description,
                "Value": render_output(output, ctx),
            }),
        );
    }

    let mut template = Map::new();
    template.insert("AWSTemplateFormatVersion".to_string(), json!(TEMPLATE_VERSION));
    template.insert("Description".to_string(), json!(stack.description));
    if !images.is_empty() {
        template.insert(
            "Metadata".to_string(),
            json!({ IMAGE_METADATA_KEY: images }),
        );
    }
    template.insert("Resources".to_string(), Value::Object(resources));
    template.insert("Outputs".to_string(), Value::Object(outputs));

    Ok(Value::Object(template))
}

/// Serialize a rendered template the way it is written to disk
pub fn to_pretty_string(template: &Value) -> Result<String> {
    let mut text =
        serde_json::to_string_pretty(template).context("Failed to serialize template")?;
    text.push('\n');
    Ok(text)
}

fn image_metadata(name: &str, image: &ImageBuild, ctx: &GeneratorContext) -> Value {
    json!({
        "Name": name,
        "Repository": ctx.logical_id(&image.repository.target),
        "Context": image.context.to_string_lossy(),
        "Platform": image.platform,
        "Tag": image.tag,
    })
}

fn render_output(output: &Output, ctx: &GeneratorContext) -> Value {
    json!({
        "Fn::Join": ["", [output.prefix, render_reference(&output.reference, ctx)]]
    })
}

/// Plain reference or attribute read
fn render_reference(reference: &Reference, ctx: &GeneratorContext) -> Value {
    let id = ctx.logical_id(&reference.target);
    match reference.attribute {
        Attribute::Id => json!({ "Ref": id }),
        attr => json!({ "Fn::GetAtt": [id, attr.engine_name()] }),
    }
}

/// Like [`render_reference`], but image URIs are expanded from the build
/// node since the engine does not know about image builds
fn resolve_reference(
    reference: &Reference,
    stack: &Stack,
    ctx: &GeneratorContext,
) -> Result<Value> {
    if reference.attribute != Attribute::ImageUri {
        return Ok(render_reference(reference, ctx));
    }

    match stack.get(&reference.target).map(|r| &r.kind) {
        Some(ResourceKind::Image(image)) => Ok(json!({
            "Fn::Join": ["", [
                render_reference(&image.repository, ctx),
                format!(":{}", image.tag),
            ]]
        })),
        _ => anyhow::bail!(
            "'{}' is read as an image URI but is not an image build",
            reference.target
        ),
    }
}

fn refs(references: &[Reference], ctx: &GeneratorContext) -> Value {
    Value::Array(references.iter().map(|r| render_reference(r, ctx)).collect())
}

fn render_properties(resource: &Resource, stack: &Stack, ctx: &GeneratorContext) -> Result<Value> {
    let value = match &resource.kind {
        ResourceKind::Vpc(vpc) => json!({
            "CidrBlock": vpc.cidr_block,
            "EnableDnsHostnames": vpc.enable_dns_hostnames,
            "EnableDnsSupport": vpc.enable_dns_support,
        }),
        ResourceKind::Cluster(cluster) if cluster.container_insights => json!({
            "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }],
        }),
        ResourceKind::Cluster(_) | ResourceKind::InternetGateway => json!({}),
        ResourceKind::GatewayAttachment(a) => json!({
            "VpcId": render_reference(&a.vpc, ctx),
            "InternetGatewayId": render_reference(&a.gateway, ctx),
        }),
        ResourceKind::Subnet(s) => json!({
            "VpcId": render_reference(&s.vpc, ctx),
            "CidrBlock": s.cidr_block,
            "AvailabilityZone": match &s.availability_zone {
                AvailabilityZone::Named(name) => json!(name),
                AvailabilityZone::Index(i) => json!({ "Fn::Select": [i, { "Fn::GetAZs": "" }] }),
            },
            "MapPublicIpOnLaunch": s.map_public_ip_on_launch,
            "Tags": [{ "Key": "SubnetType", "Value": s.tier.as_str() }],
        }),
        ResourceKind::RouteTable(t) => json!({ "VpcId": render_reference(&t.vpc, ctx) }),
        ResourceKind::Route(r) => {
            let mut props = Map::new();
            props.insert("RouteTableId".to_string(), render_reference(&r.route_table, ctx));
            props.insert("DestinationCidrBlock".to_string(), json!(r.destination));
            match &r.target {
                RouteTarget::InternetGateway(gw) => {
                    props.insert("GatewayId".to_string(), render_reference(gw, ctx))
                }
                RouteTarget::NatGateway(nat) => {
                    props.insert("NatGatewayId".to_string(), render_reference(nat, ctx))
                }
            };
            Value::Object(props)
        }
        ResourceKind::RouteTableAssociation(a) => json!({
            "RouteTableId": render_reference(&a.route_table, ctx),
            "SubnetId": render_reference(&a.subnet, ctx),
        }),
        ResourceKind::ElasticIp => json!({ "Domain": "vpc" }),
        ResourceKind::NatGateway(n) => json!({
            "SubnetId": render_reference(&n.subnet, ctx),
            "AllocationId": render_reference(&n.allocation, ctx),
        }),
        ResourceKind::SecurityGroup(g) => json!({
            "GroupDescription": g.description,
            "VpcId": render_reference(&g.vpc, ctx),
        }),
        ResourceKind::SecurityGroupRule(rule) => {
            let mut props = Map::new();
            props.insert("GroupId".to_string(), render_reference(&rule.group, ctx));
            props.insert("IpProtocol".to_string(), json!(rule.protocol.as_str()));
            if let Some((from, to)) = rule.ports {
                props.insert("FromPort".to_string(), json!(from));
                props.insert("ToPort".to_string(), json!(to));
            }
            let (cidr_key, group_key) = match rule.direction {
                Direction::Ingress => ("CidrIp", "SourceSecurityGroupId"),
                Direction::Egress => ("CidrIp", "DestinationSecurityGroupId"),
            };
            match &rule.peer {
                Peer::Cidr(cidr) => props.insert(cidr_key.to_string(), json!(cidr)),
                Peer::Group(group) => {
                    props.insert(group_key.to_string(), render_reference(group, ctx))
                }
            };
            Value::Object(props)
        }
        ResourceKind::Namespace(ns) => json!({
            "Name": ns.name,
            "Description": ns.description,
            "Vpc": render_reference(&ns.vpc, ctx),
        }),
        ResourceKind::LoadBalancer(lb) => json!({
            "Type": "application",
            "Scheme": if lb.internet_facing { "internet-facing" } else { "internal" },
            "Subnets": refs(&lb.subnets, ctx),
            "SecurityGroups": refs(&lb.security_groups, ctx),
        }),
        ResourceKind::TargetGroup(tg) => json!({
            "VpcId": render_reference(&tg.vpc, ctx),
            "Port": tg.port,
            "Protocol": "HTTP",
            "TargetType": "ip",
            "HealthCheckEnabled": true,
            "HealthCheckPath": tg.health_check.path,
            "HealthCheckIntervalSeconds": tg.health_check.interval,
            "HealthCheckTimeoutSeconds": tg.health_check.timeout,
            "HealthyThresholdCount": tg.health_check.healthy_threshold,
            "UnhealthyThresholdCount": tg.health_check.unhealthy_threshold,
            "TargetGroupAttributes": [{
                "Key": "deregistration_delay.timeout_seconds",
                "Value": tg.deregistration_delay.to_string(),
            }],
        }),
        ResourceKind::Listener(l) => json!({
            "LoadBalancerArn": render_reference(&l.load_balancer, ctx),
            "Port": l.port,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "Type": "forward",
                "TargetGroupArn": render_reference(&l.target_group, ctx),
            }],
        }),
        ResourceKind::Repository(repo) => json!({
            "ImageTagMutability": if repo.immutable_tags { "IMMUTABLE" } else { "MUTABLE" },
            "EmptyOnDelete": repo.force_delete,
        }),
        ResourceKind::Image(_) => json!({}),
        ResourceKind::ExecutionRole(role) => json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": role.managed_policies,
        }),
        ResourceKind::LogGroup(lg) => json!({ "RetentionInDays": lg.retention_days }),
        ResourceKind::TaskDefinition(td) => render_task_definition(td, stack, ctx)?,
        ResourceKind::Service(svc) => {
            let mut props = Map::new();
            props.insert("Cluster".to_string(), render_reference(&svc.cluster, ctx));
            props.insert("TaskDefinition".to_string(), render_reference(&svc.task_definition, ctx));
            props.insert("LaunchType".to_string(), json!("FARGATE"));
            props.insert("DesiredCount".to_string(), json!(svc.desired_count));
            props.insert(
                "NetworkConfiguration".to_string(),
                json!({
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": if svc.assign_public_ip { "ENABLED" } else { "DISABLED" },
                        "Subnets": refs(&svc.subnets, ctx),
                        "SecurityGroups": refs(&svc.security_groups, ctx),
                    }
                }),
            );
            if let Some(cb) = svc.circuit_breaker {
                props.insert(
                    "DeploymentConfiguration".to_string(),
                    json!({
                        "DeploymentCircuitBreaker": { "Enable": cb.enable, "Rollback": cb.rollback }
                    }),
                );
            }
            if let Some(sc) = &svc.service_connect {
                let services: Vec<Value> = sc
                    .services
                    .iter()
                    .map(|s| {
                        json!({
                            "PortName": s.port_name,
                            "DiscoveryName": s.discovery_name,
                            "ClientAliases": s.client_aliases.iter().map(|a| json!({
                                "DnsName": a.dns_name,
                                "Port": a.port,
                            })).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                props.insert(
                    "ServiceConnectConfiguration".to_string(),
                    json!({
                        "Enabled": true,
                        "Namespace": render_reference(&sc.namespace, ctx),
                        "Services": services,
                    }),
                );
            }
            if !svc.load_balancers.is_empty() {
                let attachments: Vec<Value> = svc
                    .load_balancers
                    .iter()
                    .map(|lb| {
                        json!({
                            "TargetGroupArn": render_reference(&lb.target_group, ctx),
                            "ContainerName": lb.container_name,
                            "ContainerPort": lb.container_port,
                        })
                    })
                    .collect();
                props.insert("LoadBalancers".to_string(), json!(attachments));
            }
            Value::Object(props)
        }
        ResourceKind::FileSystem(fs) => json!({
            "Encrypted": fs.encrypted,
            "PerformanceMode": "generalPurpose",
        }),
        ResourceKind::MountTarget(mt) => json!({
            "FileSystemId": render_reference(&mt.file_system, ctx),
            "SubnetId": render_reference(&mt.subnet, ctx),
            "SecurityGroups": refs(&mt.security_groups, ctx),
        }),
        ResourceKind::AccessPoint(ap) => json!({
            "FileSystemId": render_reference(&ap.file_system, ctx),
        }),
    };
    Ok(value)
}

fn render_task_definition(
    td: &TaskDefinition,
    stack: &Stack,
    ctx: &GeneratorContext,
) -> Result<Value> {
    let containers = td
        .containers
        .iter()
        .map(|c| render_container(c, stack, ctx))
        .collect::<Result<Vec<_>>>()?;

    let volumes: Vec<Value> = td
        .volumes
        .iter()
        .map(|v| {
            let mut efs = Map::new();
            efs.insert("FilesystemId".to_string(), render_reference(&v.efs.file_system, ctx));
            efs.insert(
                "TransitEncryption".to_string(),
                json!(if v.efs.transit_encryption { "ENABLED" } else { "DISABLED" }),
            );
            if let Some(ap) = &v.efs.access_point {
                efs.insert(
                    "AuthorizationConfig".to_string(),
                    json!({
                        "AccessPointId": render_reference(ap, ctx),
                        "IAM": if v.efs.iam_authorization { "ENABLED" } else { "DISABLED" },
                    }),
                );
            }
            json!({ "Name": v.name, "EFSVolumeConfiguration": efs })
        })
        .collect();

    let mut props = Map::new();
    props.insert("Family".to_string(), json!(td.family));
    props.insert("Cpu".to_string(), json!(td.cpu.to_string()));
    props.insert("Memory".to_string(), json!(td.memory.to_string()));
    props.insert("NetworkMode".to_string(), json!("awsvpc"));
    props.insert("RequiresCompatibilities".to_string(), json!(["FARGATE"]));
    props.insert("ExecutionRoleArn".to_string(), render_reference(&td.execution_role, ctx));
    props.insert("ContainerDefinitions".to_string(), json!(containers));
    if !volumes.is_empty() {
        props.insert("Volumes".to_string(), json!(volumes));
    }
    Ok(Value::Object(props))
}

fn render_container(
    c: &ContainerDefinition,
    stack: &Stack,
    ctx: &GeneratorContext,
) -> Result<Value> {
    let image = match &c.image {
        ImageSource::Built(reference) => resolve_reference(reference, stack, ctx)?,
        ImageSource::Registry(image) => json!(image),
    };

    let mut def = Map::new();
    def.insert("Name".to_string(), json!(c.name));
    def.insert("Image".to_string(), image);
    def.insert("Cpu".to_string(), json!(c.cpu));
    def.insert("Memory".to_string(), json!(c.memory));
    def.insert("Essential".to_string(), json!(c.essential));
    def.insert(
        "PortMappings".to_string(),
        json!(c
            .port_mappings
            .iter()
            .map(|p| json!({
                "Name": p.name,
                "ContainerPort": p.container_port,
                "HostPort": p.host_port,
                "Protocol": "tcp",
            }))
            .collect::<Vec<_>>()),
    );
    if !c.environment.is_empty() {
        def.insert(
            "Environment".to_string(),
            json!(c
                .environment
                .iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect::<Vec<_>>()),
        );
    }
    if !c.secrets.is_empty() {
        def.insert(
            "Secrets".to_string(),
            json!(c
                .secrets
                .iter()
                .map(|(name, from)| json!({ "Name": name, "ValueFrom": from }))
                .collect::<Vec<_>>()),
        );
    }
    if let Some(hc) = &c.health_check {
        def.insert(
            "HealthCheck".to_string(),
            json!({
                "Command": hc.command,
                "Interval": hc.interval,
                "Timeout": hc.timeout,
                "Retries": hc.retries,
                "StartPeriod": hc.start_period,
            }),
        );
    }
    if !c.mount_points.is_empty() {
        def.insert(
            "MountPoints".to_string(),
            json!(c
                .mount_points
                .iter()
                .map(|m| json!({
                    "SourceVolume": m.source_volume,
                    "ContainerPath": m.container_path,
                    "ReadOnly": m.read_only,
                }))
                .collect::<Vec<_>>()),
        );
    }
    def.insert(
        "LogConfiguration".to_string(),
        json!({
            "LogDriver": "awslogs",
            "Options": {
                "awslogs-group": render_reference(&c.log_group, ctx),
                "awslogs-region": { "Ref": "AWS::Region" },
                "awslogs-stream-prefix": c.name,
            }
        }),
    );
    Ok(Value::Object(def))
}
