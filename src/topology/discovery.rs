use anyhow::Result;

use crate::config::DiscoveryConfig;
use crate::models::{
    ClientAlias, PrivateDnsNamespace, Reference, Resource, ResourceKind, ServiceConnect,
    ServiceConnectService, Stack,
};

use super::network::Network;

pub const NAMESPACE: &str = "private-namespace";

/// Declare the private DNS namespace workloads register under
pub fn build_namespace(
    stack: &mut Stack,
    config: &DiscoveryConfig,
    network: &Network,
) -> Result<String> {
    stack.add(Resource::new(
        NAMESPACE,
        ResourceKind::Namespace(PrivateDnsNamespace {
            name: config.namespace.clone(),
            description: config.description.clone(),
            vpc: Reference::id(&network.vpc),
        }),
    ))?;
    Ok(NAMESPACE.to_string())
}

/// Service-connect registration binding `discovery_name` and a client alias
/// of the same name to the container port called `port_name`
pub fn registration(
    namespace: &str,
    discovery_name: &str,
    port_name: &str,
    port: u16,
) -> ServiceConnect {
    ServiceConnect {
        namespace: Reference::arn(namespace),
        services: vec![ServiceConnectService {
            port_name: port_name.to_string(),
            discovery_name: discovery_name.to_string(),
            client_aliases: vec![ClientAlias {
                dns_name: discovery_name.to_string(),
                port,
            }],
        }],
    }
}

/// Fully qualified name a registered service resolves under
pub fn qualified_name(discovery_name: &str, namespace_domain: &str) -> String {
    format!("{}.{}", discovery_name, namespace_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration() {
        let sc = registration(NAMESPACE, "main-db", "pg", 5432);
        assert_eq!(sc.namespace, Reference::arn(NAMESPACE));
        assert_eq!(sc.services.len(), 1);
        assert_eq!(sc.services[0].port_name, "pg");
        assert_eq!(sc.services[0].discovery_name, "main-db");
        assert_eq!(
            sc.services[0].client_aliases,
            vec![ClientAlias {
                dns_name: "main-db".to_string(),
                port: 5432
            }]
        );
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("frontend", "novella.local"), "frontend.novella.local");
    }
}
