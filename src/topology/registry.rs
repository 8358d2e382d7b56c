use anyhow::Result;

use crate::config::ImageConfig;
use crate::models::{Attribute, ImageBuild, Reference, Repository, Resource, ResourceKind, Stack};

pub const REPOSITORY: &str = "repo";
pub const IMAGE: &str = "image";

#[derive(Debug, Clone)]
pub struct ImagePipeline {
    pub repository: String,
    pub image: String,
    pub tag: String,
}

impl ImagePipeline {
    pub fn image_uri(&self) -> Reference {
        Reference::new(&self.image, Attribute::ImageUri)
    }
}

/// Declare the registry and the build step that publishes `tag` into it
pub fn build_registry(stack: &mut Stack, config: &ImageConfig, tag: &str) -> Result<ImagePipeline> {
    stack.add(Resource::new(
        REPOSITORY,
        ResourceKind::Repository(Repository {
            immutable_tags: config.immutable_tags,
            force_delete: config.force_delete,
        }),
    ))?;

    stack.add(Resource::new(
        IMAGE,
        ResourceKind::Image(ImageBuild {
            repository: Reference::new(REPOSITORY, Attribute::RepositoryUri),
            context: config.context.clone(),
            platform: config.platform.clone(),
            tag: tag.to_string(),
        }),
    ))?;

    Ok(ImagePipeline {
        repository: REPOSITORY.to_string(),
        image: IMAGE.to_string(),
        tag: tag.to_string(),
    })
}
