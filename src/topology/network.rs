//! Network fabric: VPC, three subnet tiers per zone, routing and NAT egress.

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{NatStrategy, NetworkConfig};
use crate::models::{
    Attribute, AvailabilityZone, GatewayAttachment, NatGateway, Reference, Resource, ResourceKind,
    Route, RouteTable, RouteTableAssociation, RouteTarget, Stack, Subnet, SubnetTier, Vpc,
};
use crate::utils::Ipv4Cidr;

pub const VPC: &str = "vpc";
const INTERNET_GATEWAY: &str = "vpc-igw";
const GATEWAY_ATTACHMENT: &str = "vpc-igw-attachment";

const TIERS: [SubnetTier; 3] = [SubnetTier::Public, SubnetTier::Private, SubnetTier::Isolated];

/// Names of the network resources other components attach to
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
    pub isolated_subnets: Vec<String>,
    pub nat_gateways: Vec<String>,
}

impl Network {
    pub fn subnets(&self, tier: SubnetTier) -> &[String] {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Private => &self.private_subnets,
            SubnetTier::Isolated => &self.isolated_subnets,
        }
    }

    pub fn subnet_refs(&self, tier: SubnetTier) -> Vec<Reference> {
        self.subnets(tier).iter().map(Reference::id).collect()
    }
}

fn subnet_name(tier: SubnetTier, zone: u32) -> String {
    format!("{}-{}-{}", VPC, tier.as_str(), zone + 1)
}

/// Declare the VPC and everything routing-related inside it
pub fn build_network(stack: &mut Stack, config: &NetworkConfig) -> Result<Network> {
    let block: Ipv4Cidr = config
        .cidr_block
        .parse()
        .with_context(|| format!("Invalid VPC CIDR block '{}'", config.cidr_block))?;

    stack.add(Resource::new(
        VPC,
        ResourceKind::Vpc(Vpc {
            cidr_block: block.to_string(),
            enable_dns_hostnames: config.enable_dns_hostnames,
            enable_dns_support: true,
        }),
    ))?;
    stack.add(Resource::new(INTERNET_GATEWAY, ResourceKind::InternetGateway))?;
    stack.add(Resource::new(
        GATEWAY_ATTACHMENT,
        ResourceKind::GatewayAttachment(GatewayAttachment {
            vpc: Reference::id(VPC),
            gateway: Reference::id(INTERNET_GATEWAY),
        }),
    ))?;

    let mut network = Network {
        vpc: VPC.to_string(),
        public_subnets: Vec::new(),
        private_subnets: Vec::new(),
        isolated_subnets: Vec::new(),
        nat_gateways: Vec::new(),
    };

    for (tier_index, tier) in TIERS.iter().copied().enumerate() {
        for zone in 0..config.zone_count {
            let index = tier_index as u32 * config.zone_count + zone;
            let cidr = block
                .subnet(config.subnet_prefix, index)
                .with_context(|| {
                    format!("Failed to allocate {} subnet {}", tier.as_str(), zone + 1)
                })?;
            let name = subnet_name(tier, zone);

            let availability_zone = match config.availability_zones.get(zone as usize) {
                Some(az) => AvailabilityZone::Named(az.clone()),
                None => AvailabilityZone::Index(zone),
            };

            debug!(subnet = %name, cidr = %cidr, tier = tier.as_str(), "allocated subnet");

            stack.add(Resource::new(
                name.clone(),
                ResourceKind::Subnet(Subnet {
                    vpc: Reference::id(VPC),
                    cidr_block: cidr.to_string(),
                    availability_zone,
                    tier,
                    map_public_ip_on_launch: tier == SubnetTier::Public,
                }),
            ))?;

            let route_table = format!("{}-rt", name);
            stack.add(Resource::new(
                route_table.clone(),
                ResourceKind::RouteTable(RouteTable {
                    vpc: Reference::id(VPC),
                }),
            ))?;
            stack.add(Resource::new(
                format!("{}-rt-assoc", name),
                ResourceKind::RouteTableAssociation(RouteTableAssociation {
                    route_table: Reference::id(&route_table),
                    subnet: Reference::id(&name),
                }),
            ))?;

            match tier {
                SubnetTier::Public => network.public_subnets.push(name),
                SubnetTier::Private => network.private_subnets.push(name),
                SubnetTier::Isolated => network.isolated_subnets.push(name),
            }
        }
    }

    // public subnets route to the internet gateway
    for subnet in &network.public_subnets {
        stack.add(
            Resource::new(
                format!("{}-default-route", subnet),
                ResourceKind::Route(Route {
                    route_table: Reference::id(format!("{}-rt", subnet)),
                    destination: "0.0.0.0/0".to_string(),
                    target: RouteTarget::InternetGateway(Reference::id(INTERNET_GATEWAY)),
                }),
            )
            .depends_on(GATEWAY_ATTACHMENT),
        )?;
    }

    let nat_count = match config.nat_strategy {
        NatStrategy::Single => 1,
        NatStrategy::OnePerAz => network.public_subnets.len(),
    };
    for (i, subnet) in network.public_subnets.iter().take(nat_count).enumerate() {
        let eip = format!("{}-nat-eip-{}", VPC, i + 1);
        let nat = format!("{}-nat-{}", VPC, i + 1);
        stack.add(
            Resource::new(eip.clone(), ResourceKind::ElasticIp).depends_on(GATEWAY_ATTACHMENT),
        )?;
        stack.add(Resource::new(
            nat.clone(),
            ResourceKind::NatGateway(NatGateway {
                subnet: Reference::id(subnet),
                allocation: Reference::new(eip, Attribute::AllocationId),
            }),
        ))?;
        network.nat_gateways.push(nat);
    }

    // private subnets egress through NAT, isolated subnets get no default route
    for (i, subnet) in network.private_subnets.iter().enumerate() {
        let nat = &network.nat_gateways[i % network.nat_gateways.len()];
        stack.add(Resource::new(
            format!("{}-default-route", subnet),
            ResourceKind::Route(Route {
                route_table: Reference::id(format!("{}-rt", subnet)),
                destination: "0.0.0.0/0".to_string(),
                target: RouteTarget::NatGateway(Reference::id(nat)),
            }),
        ))?;
    }

    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet<'a>(stack: &'a Stack, name: &str) -> &'a Subnet {
        match &stack.get(name).unwrap().kind {
            ResourceKind::Subnet(s) => s,
            other => panic!("{} is not a subnet: {:?}", name, other),
        }
    }

    #[test]
    fn test_default_layout() {
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &NetworkConfig::default()).unwrap();

        assert_eq!(network.public_subnets, vec!["vpc-public-1", "vpc-public-2"]);
        assert_eq!(network.private_subnets, vec!["vpc-private-1", "vpc-private-2"]);
        assert_eq!(network.isolated_subnets, vec!["vpc-isolated-1", "vpc-isolated-2"]);
        assert_eq!(network.nat_gateways, vec!["vpc-nat-1"]);

        assert_eq!(subnet(&stack, "vpc-public-1").cidr_block, "10.0.0.0/20");
        assert_eq!(subnet(&stack, "vpc-public-2").cidr_block, "10.0.16.0/20");
        assert_eq!(subnet(&stack, "vpc-private-1").cidr_block, "10.0.32.0/20");
        assert_eq!(subnet(&stack, "vpc-isolated-2").cidr_block, "10.0.80.0/20");
        assert!(subnet(&stack, "vpc-public-1").map_public_ip_on_launch);
        assert!(!subnet(&stack, "vpc-private-1").map_public_ip_on_launch);
        assert_eq!(
            subnet(&stack, "vpc-private-2").availability_zone,
            AvailabilityZone::Index(1)
        );
    }

    #[test]
    fn test_routes_per_tier() {
        let mut stack = Stack::new("test", "");
        build_network(&mut stack, &NetworkConfig::default()).unwrap();

        let routes: Vec<_> = stack
            .filter(|k| match k {
                ResourceKind::Route(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(routes.len(), 4);

        for (name, route) in routes {
            match &route.target {
                RouteTarget::InternetGateway(_) => assert!(name.starts_with("vpc-public")),
                RouteTarget::NatGateway(nat) => {
                    assert!(name.starts_with("vpc-private"));
                    assert_eq!(nat.target, "vpc-nat-1");
                }
            }
        }
        assert!(stack.get("vpc-isolated-1-default-route").is_none());
    }

    #[test]
    fn test_one_nat_per_zone_with_named_zones() {
        let config = NetworkConfig {
            nat_strategy: NatStrategy::OnePerAz,
            availability_zones: vec!["eu-west-1a".to_string(), "eu-west-1b".to_string()],
            ..NetworkConfig::default()
        };
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &config).unwrap();

        assert_eq!(network.nat_gateways, vec!["vpc-nat-1", "vpc-nat-2"]);
        assert_eq!(
            subnet(&stack, "vpc-public-2").availability_zone,
            AvailabilityZone::Named("eu-west-1b".to_string())
        );
        match &stack.get("vpc-private-2-default-route").unwrap().kind {
            ResourceKind::Route(r) => assert_eq!(r.target.reference().target, "vpc-nat-2"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_block_too_small() {
        let config = NetworkConfig {
            cidr_block: "10.0.0.0/22".to_string(),
            subnet_prefix: 24,
            ..NetworkConfig::default()
        };
        let mut stack = Stack::new("test", "");
        assert!(build_network(&mut stack, &config).is_err());
    }
}
