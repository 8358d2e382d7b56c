use serde::Serialize;
use std::fmt;

/// Attribute of a resource that another resource can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Attribute {
    /// The primary identifier (what the engine returns for a plain reference)
    Id,
    Arn,
    DnsName,
    RepositoryUri,
    AllocationId,
    /// Fully qualified URI of a built image (`<repository uri>:<tag>`)
    ImageUri,
}

impl Attribute {
    /// Name of the attribute as the provisioning engine exposes it
    pub fn engine_name(&self) -> &'static str {
        match self {
            Attribute::Id => "Id",
            Attribute::Arn => "Arn",
            Attribute::DnsName => "DNSName",
            Attribute::RepositoryUri => "RepositoryUri",
            Attribute::AllocationId => "AllocationId",
            Attribute::ImageUri => "ImageUri",
        }
    }
}

/// An attribute-reference edge: the owner reads `attribute` of `target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Reference {
    pub target: String,
    pub attribute: Attribute,
}

impl Reference {
    pub fn new(target: impl Into<String>, attribute: Attribute) -> Self {
        Reference {
            target: target.into(),
            attribute,
        }
    }

    pub fn id(target: impl Into<String>) -> Self {
        Self::new(target, Attribute::Id)
    }

    pub fn arn(target: impl Into<String>) -> Self {
        Self::new(target, Attribute::Arn)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attribute {
            Attribute::Id => write!(f, "{}", self.target),
            attr => write!(f, "{}.{}", self.target, attr.engine_name()),
        }
    }
}
