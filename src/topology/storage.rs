//! Durable storage: an EFS file system reachable from the private subnets.

use anyhow::Result;

use crate::config::StorageConfig;
use crate::models::{
    AccessPoint, Direction, FileSystem, MountTarget, Peer, Protocol, Reference, Resource,
    ResourceKind, SecurityGroup, Stack,
};

use super::network::Network;
use super::security::{rule, SecurityGroups};

pub const FILE_SYSTEM: &str = "postgres-efs";
pub const MOUNT_TARGET_GROUP: &str = "mount-target-sg";
const ACCESS_POINT: &str = "efs-access-point";

#[derive(Debug, Clone)]
pub struct Storage {
    pub file_system: String,
    pub access_point: String,
    pub mount_targets: Vec<String>,
    pub nfs_port: u16,
}

fn mount_target_name(index: usize) -> String {
    match index {
        0 => "efs-mount-target".to_string(),
        n => format!("efs-mount-target-{}", n + 1),
    }
}

pub fn build_storage(
    stack: &mut Stack,
    config: &StorageConfig,
    network: &Network,
    security: &SecurityGroups,
) -> Result<Storage> {
    stack.add(Resource::new(
        FILE_SYSTEM,
        ResourceKind::FileSystem(FileSystem {
            encrypted: config.encrypted,
        }),
    ))?;

    stack.add(Resource::new(
        MOUNT_TARGET_GROUP,
        ResourceKind::SecurityGroup(SecurityGroup {
            vpc: Reference::id(&network.vpc),
            description: "NFS access to the file system from internal workloads".to_string(),
        }),
    ))?;

    // NFS in from the workload group only
    stack.add(Resource::new(
        "nfs-ingress",
        rule(
            MOUNT_TARGET_GROUP,
            Direction::Ingress,
            Protocol::Tcp,
            Some((config.nfs_port, config.nfs_port)),
            Peer::Group(Reference::id(&security.internal)),
        ),
    ))?;

    stack.add(Resource::new(
        "all-egress",
        rule(
            MOUNT_TARGET_GROUP,
            Direction::Egress,
            Protocol::All,
            None,
            Peer::Group(Reference::id(&security.internal)),
        ),
    ))?;

    stack.add(Resource::new(
        ACCESS_POINT,
        ResourceKind::AccessPoint(AccessPoint {
            file_system: Reference::id(FILE_SYSTEM),
        }),
    ))?;

    let mut mount_targets = Vec::new();
    for (i, subnet) in network.private_subnets.iter().enumerate() {
        let name = mount_target_name(i);
        stack.add(Resource::new(
            name.clone(),
            ResourceKind::MountTarget(MountTarget {
                file_system: Reference::id(FILE_SYSTEM),
                subnet: Reference::id(subnet),
                security_groups: vec![Reference::id(MOUNT_TARGET_GROUP)],
            }),
        ))?;
        mount_targets.push(name);
    }

    Ok(Storage {
        file_system: FILE_SYSTEM.to_string(),
        access_point: ACCESS_POINT.to_string(),
        mount_targets,
        nfs_port: config.nfs_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, SecurityConfig};
    use crate::topology::network::build_network;
    use crate::topology::security::build_security;

    #[test]
    fn test_one_mount_target_per_private_subnet() {
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &NetworkConfig::default()).unwrap();
        let security = build_security(&mut stack, &SecurityConfig::default(), &network).unwrap();
        let storage =
            build_storage(&mut stack, &StorageConfig::default(), &network, &security).unwrap();

        assert_eq!(storage.mount_targets, vec!["efs-mount-target", "efs-mount-target-2"]);

        let subnets: Vec<_> = stack
            .filter(|k| match k {
                ResourceKind::MountTarget(mt) => Some(mt),
                _ => None,
            })
            .map(|(_, mt)| mt.subnet.target.clone())
            .collect();
        assert_eq!(subnets, network.private_subnets);
    }

    #[test]
    fn test_nfs_ingress_only_from_internal_group() {
        let mut stack = Stack::new("test", "");
        let network = build_network(&mut stack, &NetworkConfig::default()).unwrap();
        let security = build_security(&mut stack, &SecurityConfig::default(), &network).unwrap();
        build_storage(&mut stack, &StorageConfig::default(), &network, &security).unwrap();

        match &stack.get("nfs-ingress").unwrap().kind {
            ResourceKind::SecurityGroupRule(r) => {
                assert_eq!(r.group.target, MOUNT_TARGET_GROUP);
                assert_eq!(r.protocol, Protocol::Tcp);
                assert_eq!(r.ports, Some((2049, 2049)));
                assert_eq!(r.peer, Peer::Group(Reference::id(&security.internal)));
            }
            _ => unreachable!(),
        }
    }
}
