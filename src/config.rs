use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::{fargate_task_size, Ipv4Cidr};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Stack identity and naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub name: String,
    pub description: String,
    /// Prepended to every logical ID in the rendered template
    pub logical_id_prefix: String,
    /// Turn on CloudWatch Container Insights for the cluster
    pub container_insights: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            name: "novella".to_string(),
            description: "Novella application stack".to_string(),
            logical_id_prefix: String::new(),
            container_insights: false,
        }
    }
}

/// How many NAT gateways serve the private subnets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NatStrategy {
    /// One gateway in the first public subnet shared by every AZ
    #[default]
    Single,
    /// One gateway per availability zone
    OnePerAz,
}

/// Network fabric: VPC block, zones and subnet layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub cidr_block: String,
    /// Number of availability zones to spread subnets across
    pub zone_count: u32,
    /// Explicit zone names. When empty, zones are picked by index from the
    /// deployment region.
    pub availability_zones: Vec<String>,
    /// Prefix length of every subnet
    pub subnet_prefix: u8,
    pub nat_strategy: NatStrategy,
    pub enable_dns_hostnames: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            cidr_block: "10.0.0.0/16".to_string(),
            zone_count: 2,
            availability_zones: Vec::new(),
            subnet_prefix: 20,
            nat_strategy: NatStrategy::Single,
            enable_dns_hostnames: true,
        }
    }
}

/// Which security group receives the allow-all-from-internet ingress rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngressPlacement {
    #[default]
    External,
    /// Legacy layout: the public rule lands on the workload group
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub public_ingress_group: IngressPlacement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Private DNS domain, e.g. `novella.local`
    pub namespace: String,
    pub description: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            namespace: "novella.local".to_string(),
            description: "Private DNS namespace for service discovery".to_string(),
        }
    }
}

/// Target group health check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub path: String,
    pub interval: u32,
    pub timeout: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            path: "/".to_string(),
            interval: 30,
            timeout: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub listener_port: u16,
    /// Seconds to wait before deregistering a draining target
    pub deregistration_delay: u32,
    pub health_check: HealthCheckConfig,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        LoadBalancerConfig {
            listener_port: 80,
            deregistration_delay: 5,
            health_check: HealthCheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enable: bool,
    pub rollback: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            enable: true,
            rollback: true,
        }
    }
}

/// Application image build inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Build context directory
    pub context: PathBuf,
    pub platform: String,
    /// Paths skipped when digesting the build context
    pub exclude: Vec<String>,
    /// Pin the image tag instead of deriving it from the build context
    pub tag: Option<String>,
    pub immutable_tags: bool,
    pub force_delete: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            context: PathBuf::from("../"),
            platform: "linux/amd64".to_string(),
            exclude: vec![
                "target".to_string(),
                ".git".to_string(),
                "node_modules".to_string(),
                "infra".to_string(),
            ],
            tag: None,
            immutable_tags: true,
            force_delete: true,
        }
    }
}

/// The internet-facing application service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    /// Container CPU units
    pub cpu: u32,
    /// Container memory (MiB)
    pub memory: u32,
    pub container_port: u16,
    pub desired_count: u32,
    pub discovery_name: String,
    pub port_name: String,
    pub image: ImageConfig,
    pub environment: BTreeMap<String, String>,
    /// Variable name -> secret parameter name or ARN
    pub secrets: BTreeMap<String, String>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            name: "app".to_string(),
            cpu: 512,
            memory: 128,
            container_port: 80,
            desired_count: 1,
            discovery_name: "frontend".to_string(),
            port_name: "front".to_string(),
            image: ImageConfig::default(),
            environment: BTreeMap::from([("PORT".to_string(), "80".to_string())]),
            secrets: BTreeMap::from([
                (
                    "DATABASE_URL".to_string(),
                    "/novella/app/database-url".to_string(),
                ),
                (
                    "SESSION_SECRET".to_string(),
                    "/novella/app/session-secret".to_string(),
                ),
            ]),
            circuit_breaker: Some(CircuitBreakerConfig {
                enable: true,
                rollback: false,
            }),
        }
    }
}

/// Container-level health check run by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerHealthCheckConfig {
    /// Shell command, run as `CMD-SHELL`
    pub command: String,
    pub interval: u32,
    pub timeout: u32,
    pub retries: u32,
    pub start_period: u32,
}

impl Default for ContainerHealthCheckConfig {
    fn default() -> Self {
        ContainerHealthCheckConfig {
            command: "pg_isready -U postgres".to_string(),
            interval: 30,
            timeout: 5,
            retries: 3,
            start_period: 60,
        }
    }
}

/// The internal database service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub image: String,
    pub cpu: u32,
    pub memory: u32,
    pub port: u16,
    pub desired_count: u32,
    pub discovery_name: String,
    pub port_name: String,
    pub volume_name: String,
    pub data_dir: String,
    pub environment: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub health_check: ContainerHealthCheckConfig,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: "postgres".to_string(),
            image: "postgres:latest".to_string(),
            cpu: 256,
            memory: 512,
            port: 5432,
            desired_count: 1,
            discovery_name: "main-db".to_string(),
            port_name: "pg".to_string(),
            volume_name: "postgres-data".to_string(),
            data_dir: "/var/lib/postgresql/data".to_string(),
            environment: BTreeMap::from([
                ("POSTGRES_USER".to_string(), "postgres".to_string()),
                ("POSTGRES_DB".to_string(), "postgres".to_string()),
            ]),
            secrets: BTreeMap::from([(
                "POSTGRES_PASSWORD".to_string(),
                "/novella/postgres/password".to_string(),
            )]),
            health_check: ContainerHealthCheckConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig {
                enable: true,
                rollback: true,
            }),
        }
    }
}

/// Shared file system backing the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub encrypted: bool,
    pub transit_encryption: bool,
    pub iam_authorization: bool,
    pub nfs_port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            encrypted: true,
            transit_encryption: true,
            iam_authorization: false,
            nfs_port: 2049,
        }
    }
}

/// Output configuration - where to write the rendered template and plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub template_file: PathBuf,
    pub plan_file: PathBuf,
    /// Days to keep container logs
    pub log_retention_days: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            template_file: PathBuf::from("out/novella.template.json"),
            plan_file: PathBuf::from("out/novella.plan.txt"),
            log_retention_days: 14,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let vpc: Ipv4Cidr = self
            .network
            .cidr_block
            .parse()
            .with_context(|| format!("Invalid network.cidr_block '{}'", self.network.cidr_block))?;

        if self.network.zone_count == 0 {
            anyhow::bail!("network.zone_count must be at least 1");
        }
        if !self.network.availability_zones.is_empty()
            && (self.network.availability_zones.len() as u32) < self.network.zone_count
        {
            anyhow::bail!(
                "network.availability_zones lists {} zones but zone_count is {}",
                self.network.availability_zones.len(),
                self.network.zone_count
            );
        }

        // three tiers per zone must fit in the VPC block
        let needed = u64::from(self.network.zone_count) * 3;
        let capacity = vpc
            .subnet_capacity(self.network.subnet_prefix)
            .with_context(|| {
                format!(
                    "network.subnet_prefix /{} does not fit in {}",
                    self.network.subnet_prefix, self.network.cidr_block
                )
            })?;
        if capacity < needed {
            anyhow::bail!(
                "{} holds {} /{} subnets, {} are needed",
                self.network.cidr_block,
                capacity,
                self.network.subnet_prefix,
                needed
            );
        }

        if self.discovery.namespace.trim().is_empty() {
            anyhow::bail!("discovery.namespace must not be empty");
        }

        for (section, cpu, memory) in [
            ("app", self.app.cpu, self.app.memory),
            ("database", self.database.cpu, self.database.memory),
        ] {
            if cpu == 0 || memory == 0 {
                anyhow::bail!("{}.cpu and {}.memory must be positive", section, section);
            }
            if fargate_task_size(cpu, memory).is_none() {
                anyhow::bail!(
                    "{}: no Fargate task size fits cpu={} memory={}",
                    section,
                    cpu,
                    memory
                );
            }
        }

        if self.app.name == self.database.name {
            anyhow::bail!(
                "app.name and database.name must differ (both are '{}')",
                self.app.name
            );
        }

        if self.app.image.tag.is_none() && !self.app.image.context.exists() {
            anyhow::bail!(
                "Build context does not exist: {}",
                self.app.image.context.display()
            );
        }

        Ok(())
    }

    /// Generate a default configuration
    pub fn default_config() -> Self {
        Config::default()
    }

    /// Write the default configuration to `path`. An existing file is only
    /// replaced when `force` is set.
    pub fn init(path: &Path, force: bool) -> Result<Self> {
        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file already exists: {}. Use --force to overwrite.",
                path.display()
            );
        }

        let config = Config::default_config();
        config.save(path)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned() -> Config {
        let mut config = Config::default_config();
        config.app.image.tag = Some("v1".to_string());
        config
    }

    #[test]
    fn test_defaults_match_declared_topology() {
        let config = Config::default_config();
        assert_eq!(config.network.cidr_block, "10.0.0.0/16");
        assert_eq!(config.network.zone_count, 2);
        assert_eq!(config.discovery.namespace, "novella.local");
        assert_eq!(config.app.cpu, 512);
        assert_eq!(config.app.memory, 128);
        assert_eq!(config.app.image.platform, "linux/amd64");
        assert_eq!(config.database.health_check.command, "pg_isready -U postgres");
        assert_eq!(config.load_balancer.health_check.timeout, 5);
    }

    #[test]
    fn test_defaults_carry_no_plaintext_credentials() {
        let config = Config::default_config();
        assert!(!config.app.environment.contains_key("SESSION_SECRET"));
        assert!(!config.app.environment.contains_key("DATABASE_URL"));
        assert!(!config.database.environment.contains_key("POSTGRES_PASSWORD"));
        assert!(config.database.secrets.contains_key("POSTGRES_PASSWORD"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[app]
cpu = 1024
memory = 2048

[network]
nat_strategy = "one-per-az"
"#,
        )
        .unwrap();
        assert_eq!(config.app.cpu, 1024);
        assert_eq!(config.app.port_name, "front");
        assert_eq!(config.network.nat_strategy, NatStrategy::OnePerAz);
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_validate_rejects_bad_network() {
        let mut config = pinned();
        config.network.cidr_block = "10.0.0.0/33".to_string();
        assert!(config.validate().is_err());

        let mut config = pinned();
        config.network.cidr_block = "10.0.0.0/24".to_string();
        assert!(config.validate().is_err());

        let mut config = pinned();
        config.network.zone_count = 3;
        config.network.availability_zones = vec!["eu-west-1a".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_container() {
        let mut config = pinned();
        config.app.cpu = 65536;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_context_without_tag() {
        let mut config = Config::default_config();
        config.app.image.context = PathBuf::from("/definitely/not/here");
        assert!(config.validate().is_err());
        config.app.image.tag = Some("pinned".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("novella-infra.toml");
        let config = pinned();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.app.image.tag.as_deref(), Some("v1"));
        assert_eq!(loaded.database.secrets, config.database.secrets);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("novella-infra.toml");
        fs::write(&path, "[stack]\nname = \"custom\"\n").unwrap();

        let err = Config::init(&path, false).unwrap_err();
        assert!(err.to_string().contains("Use --force to overwrite"));
        assert!(fs::read_to_string(&path).unwrap().contains("custom"));

        Config::init(&path, true).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let written: Config = toml::from_str(&content).unwrap();
        assert_eq!(written.stack.name, "novella");
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(include_str!("../sample/novella-infra.toml")).unwrap();
        assert_eq!(config.app.image.context, PathBuf::from("app"));
        assert_eq!(config.database.image, "postgres:16");
        assert_eq!(config.database.environment["POSTGRES_USER"], "postgres");
        assert_eq!(config.security.public_ingress_group, IngressPlacement::External);
    }
}
