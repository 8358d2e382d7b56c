//! Security boundary: internal and external security groups.

use anyhow::Result;
use tracing::warn;

use crate::config::{IngressPlacement, SecurityConfig};
use crate::models::{
    Direction, Peer, Protocol, Reference, Resource, ResourceKind, SecurityGroup,
    SecurityGroupRule, Stack,
};

use super::network::Network;

pub const INTERNAL_GROUP: &str = "securityGroup";
pub const EXTERNAL_GROUP: &str = "external-security-group";

#[derive(Debug, Clone)]
pub struct SecurityGroups {
    /// Shared by every workload and the load balancer; members talk freely
    pub internal: String,
    /// Attached to the load balancer only
    pub external: String,
}

pub(crate) fn rule(
    group: &str,
    direction: Direction,
    protocol: Protocol,
    ports: Option<(u16, u16)>,
    peer: Peer,
) -> ResourceKind {
    ResourceKind::SecurityGroupRule(SecurityGroupRule {
        group: Reference::id(group),
        direction,
        protocol,
        ports,
        peer,
    })
}

pub fn build_security(
    stack: &mut Stack,
    config: &SecurityConfig,
    network: &Network,
) -> Result<SecurityGroups> {
    stack.add(Resource::new(
        INTERNAL_GROUP,
        ResourceKind::SecurityGroup(SecurityGroup {
            vpc: Reference::id(&network.vpc),
            description: "Traffic among internal workloads".to_string(),
        }),
    ))?;

    stack.add(Resource::new(
        "inner-traffic-in",
        rule(
            INTERNAL_GROUP,
            Direction::Ingress,
            Protocol::All,
            None,
            Peer::Group(Reference::id(INTERNAL_GROUP)),
        ),
    ))?;

    stack.add(Resource::new(
        "all-traffic-out",
        rule(
            INTERNAL_GROUP,
            Direction::Egress,
            Protocol::All,
            None,
            Peer::Cidr("0.0.0.0/0".to_string()),
        ),
    ))?;

    stack.add(Resource::new(
        EXTERNAL_GROUP,
        ResourceKind::SecurityGroup(SecurityGroup {
            vpc: Reference::id(&network.vpc),
            description: "Public ingress for the load balancer".to_string(),
        }),
    ))?;

    let public_group = match config.public_ingress_group {
        IngressPlacement::External => EXTERNAL_GROUP,
        IngressPlacement::Internal => {
            warn!(
                group = INTERNAL_GROUP,
                "public ingress is attached to the internal security group"
            );
            INTERNAL_GROUP
        }
    };

    stack.add(Resource::new(
        "all-traffic-in",
        rule(
            public_group,
            Direction::Ingress,
            Protocol::All,
            None,
            Peer::Cidr("0.0.0.0/0".to_string()),
        ),
    ))?;

    Ok(SecurityGroups {
        internal: INTERNAL_GROUP.to_string(),
        external: EXTERNAL_GROUP.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::topology::network::build_network;

    fn public_rule_group(placement: IngressPlacement) -> String {
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &NetworkConfig::default()).unwrap();
        build_security(
            &mut stack,
            &SecurityConfig {
                public_ingress_group: placement,
            },
            &network,
        )
        .unwrap();

        match &stack.get("all-traffic-in").unwrap().kind {
            ResourceKind::SecurityGroupRule(r) => {
                assert!(r.peer.is_anywhere());
                assert_eq!(r.direction, Direction::Ingress);
                r.group.target.clone()
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_public_ingress_on_external_group() {
        assert_eq!(public_rule_group(IngressPlacement::External), EXTERNAL_GROUP);
    }

    #[test]
    fn test_legacy_public_ingress_on_internal_group() {
        assert_eq!(public_rule_group(IngressPlacement::Internal), INTERNAL_GROUP);
    }

    #[test]
    fn test_internal_group_is_self_referencing() {
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &NetworkConfig::default()).unwrap();
        build_security(&mut stack, &SecurityConfig::default(), &network).unwrap();

        match &stack.get("inner-traffic-in").unwrap().kind {
            ResourceKind::SecurityGroupRule(r) => {
                assert_eq!(r.protocol, Protocol::All);
                assert_eq!(r.peer, Peer::Group(Reference::id(INTERNAL_GROUP)));
                assert_eq!(r.group.target, INTERNAL_GROUP);
            }
            _ => unreachable!(),
        }
    }
}
