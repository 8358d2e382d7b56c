use anyhow::Result;

use crate::config::LoadBalancerConfig;
use crate::models::{
    Listener, LoadBalancer, Reference, Resource, ResourceKind, Stack, SubnetTier, TargetGroup,
    TargetHealthCheck,
};

use super::network::Network;
use super::security::SecurityGroups;

pub const LOAD_BALANCER: &str = "alb";
const TARGET_GROUP: &str = "alb-tg";
const LISTENER: &str = "alb-listener";

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub load_balancer: String,
    pub target_group: String,
    pub listener: String,
}

/// Internet-facing ALB in the public subnets with one HTTP listener
/// forwarding to the default target group
pub fn build_load_balancer(
    stack: &mut Stack,
    config: &LoadBalancerConfig,
    target_port: u16,
    network: &Network,
    security: &SecurityGroups,
) -> Result<EntryPoint> {
    stack.add(Resource::new(
        LOAD_BALANCER,
        ResourceKind::LoadBalancer(LoadBalancer {
            internet_facing: true,
            subnets: network.subnet_refs(SubnetTier::Public),
            security_groups: vec![
                Reference::id(&security.internal),
                Reference::id(&security.external),
            ],
        }),
    ))?;

    let hc = &config.health_check;
    stack.add(Resource::new(
        TARGET_GROUP,
        ResourceKind::TargetGroup(TargetGroup {
            vpc: Reference::id(&network.vpc),
            port: target_port,
            deregistration_delay: config.deregistration_delay,
            health_check: TargetHealthCheck {
                path: hc.path.clone(),
                interval: hc.interval,
                timeout: hc.timeout,
                healthy_threshold: hc.healthy_threshold,
                unhealthy_threshold: hc.unhealthy_threshold,
            },
        }),
    ))?;

    stack.add(Resource::new(
        LISTENER,
        ResourceKind::Listener(Listener {
            load_balancer: Reference::id(LOAD_BALANCER),
            port: config.listener_port,
            target_group: Reference::id(TARGET_GROUP),
        }),
    ))?;

    Ok(EntryPoint {
        load_balancer: LOAD_BALANCER.to_string(),
        target_group: TARGET_GROUP.to_string(),
        listener: LISTENER.to_string(),
    })
}
