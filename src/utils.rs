use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or subdividing an IPv4 CIDR block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    #[error("invalid CIDR block '{0}': expected <address>/<prefix>")]
    Malformed(String),
    #[error("invalid prefix length {0}: must be between 0 and 32")]
    InvalidPrefix(u8),
    #[error("CIDR block '{0}' has host bits set")]
    HostBitsSet(String),
    #[error("cannot carve /{requested} subnets out of a /{parent} block")]
    PrefixTooShort { parent: u8, requested: u8 },
    #[error(
        "subnet #{index} does not fit in {block} \
         (only {available} /{prefix} subnets available)"
    )]
    Exhausted {
        block: String,
        index: u32,
        prefix: u8,
        available: u64,
    },
}

/// An IPv4 network in CIDR notation, e.g. `10.0.0.0/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > 32 {
            return Err(CidrError::InvalidPrefix(prefix));
        }
        let cidr = Ipv4Cidr { network, prefix };
        if u32::from(network) & !mask(prefix) != 0 {
            return Err(CidrError::HostBitsSet(cidr.to_string()));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of `/new_prefix` subnets this block can hold
    pub fn subnet_capacity(&self, new_prefix: u8) -> Result<u64, CidrError> {
        if new_prefix > 32 {
            return Err(CidrError::InvalidPrefix(new_prefix));
        }
        if new_prefix < self.prefix {
            return Err(CidrError::PrefixTooShort {
                parent: self.prefix,
                requested: new_prefix,
            });
        }
        Ok(1u64 << (new_prefix - self.prefix))
    }

    /// The `index`-th `/new_prefix` subnet of this block, counting from the
    /// network address
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Result<Ipv4Cidr, CidrError> {
        let available = self.subnet_capacity(new_prefix)?;
        if u64::from(index) >= available {
            return Err(CidrError::Exhausted {
                block: self.to_string(),
                index,
                prefix: new_prefix,
                available,
            });
        }
        let size = 1u64 << (32 - new_prefix);
        let start = u64::from(u32::from(self.network)) + u64::from(index) * size;
        Ipv4Cidr::new(Ipv4Addr::from(start as u32), new_prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::Malformed(s.to_string()))?;
        let network: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| CidrError::Malformed(s.to_string()))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| CidrError::Malformed(s.to_string()))?;
        Ipv4Cidr::new(network, prefix)
    }
}

/// Valid Fargate task sizes: CPU units and the memory range (MiB) allowed for it
const FARGATE_SIZES: &[(u32, u32, u32, u32)] = &[
    // (cpu, min memory, max memory, step)
    (256, 512, 512, 512),
    (256, 1024, 2048, 1024),
    (512, 1024, 4096, 1024),
    (1024, 2048, 8192, 1024),
    (2048, 4096, 16384, 1024),
    (4096, 8192, 30720, 1024),
    (8192, 16384, 61440, 4096),
    (16384, 32768, 122880, 8192),
];

/// Smallest valid Fargate task size that can hold a container of the given
/// CPU units and memory (MiB). Returns `None` when nothing is large enough.
pub fn fargate_task_size(cpu: u32, memory: u32) -> Option<(u32, u32)> {
    for &(task_cpu, min, max, step) in FARGATE_SIZES {
        if task_cpu < cpu {
            continue;
        }
        let mut task_memory = min;
        while task_memory <= max {
            if task_memory >= memory {
                return Some((task_cpu, task_memory));
            }
            task_memory += step;
        }
    }
    None
}

/// Whether a task-level CPU/memory pair is one Fargate accepts
pub fn is_valid_fargate_size(cpu: u32, memory: u32) -> bool {
    FARGATE_SIZES
        .iter()
        .any(|&(task_cpu, min, max, step)| {
            task_cpu == cpu && memory >= min && memory <= max && (memory - min) % step == 0
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_parse_cidr_rejects_garbage() {
        assert!(matches!(
            "10.0.0.0".parse::<Ipv4Cidr>(),
            Err(CidrError::Malformed(_))
        ));
        assert!(matches!(
            "10.0.0/16".parse::<Ipv4Cidr>(),
            Err(CidrError::Malformed(_))
        ));
        assert_eq!(
            "10.0.0.0/33".parse::<Ipv4Cidr>(),
            Err(CidrError::InvalidPrefix(33))
        );
        assert!(matches!(
            "10.0.1.0/16".parse::<Ipv4Cidr>(),
            Err(CidrError::HostBitsSet(_))
        ));
    }

    #[test]
    fn test_subnet_carving() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(vpc.subnet(20, 0).unwrap().to_string(), "10.0.0.0/20");
        assert_eq!(vpc.subnet(20, 1).unwrap().to_string(), "10.0.16.0/20");
        assert_eq!(vpc.subnet(20, 5).unwrap().to_string(), "10.0.80.0/20");
        assert_eq!(vpc.subnet(20, 15).unwrap().to_string(), "10.0.240.0/20");
        assert!(matches!(
            vpc.subnet(20, 16),
            Err(CidrError::Exhausted { available: 16, .. })
        ));
        assert!(matches!(
            vpc.subnet(8, 0),
            Err(CidrError::PrefixTooShort { .. })
        ));
    }

    #[test]
    fn test_fargate_task_size() {
        assert_eq!(fargate_task_size(512, 128), Some((512, 1024)));
        assert_eq!(fargate_task_size(256, 512), Some((256, 512)));
        assert_eq!(fargate_task_size(256, 1500), Some((256, 2048)));
        assert_eq!(fargate_task_size(256, 3000), Some((512, 3072)));
        assert_eq!(fargate_task_size(1000, 100), Some((1024, 2048)));
        assert_eq!(fargate_task_size(32768, 1024), None);
    }

    #[test]
    fn test_is_valid_fargate_size() {
        assert!(is_valid_fargate_size(256, 512));
        assert!(is_valid_fargate_size(512, 1024));
        assert!(is_valid_fargate_size(4096, 30720));
        assert!(!is_valid_fargate_size(512, 128));
        assert!(!is_valid_fargate_size(300, 1024));
        assert!(!is_valid_fargate_size(8192, 18432));
    }
}
