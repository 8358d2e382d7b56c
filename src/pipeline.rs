//! Synthesis pipeline: configuration in, template and plan on disk

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diff::{diff_templates, TemplateDiff};
use crate::generator::plan::generate_plan;
use crate::generator::template::{generate_template, to_pretty_string};
use crate::generator::GeneratorContext;
use crate::resolver::ResourceGraph;
use crate::scanner::Scanner;
use crate::topology::{build_stack, Topology};
use crate::validation::{validate_topology, ValidationResult};

/// A declared, resolved and validated stack
pub struct Synthesis {
    pub topology: Topology,
    pub graph: ResourceGraph,
    pub ctx: GeneratorContext,
    pub validation: ValidationResult,
}

impl Synthesis {
    pub fn image_tag(&self) -> &str {
        &self.topology.image.tag
    }

    /// Fail with every validation error listed
    pub fn ensure_valid(&self) -> Result<()> {
        if !self.validation.has_errors() {
            return Ok(());
        }
        let errors: Vec<String> = self
            .validation
            .errors
            .iter()
            .map(|e| format!("  {}", e))
            .collect();
        anyhow::bail!(
            "Validation failed with {} error(s):\n{}",
            errors.len(),
            errors.join("\n")
        )
    }
}

/// What a synth run did
#[derive(Debug)]
pub struct SynthReport {
    pub template_file: PathBuf,
    pub plan_file: PathBuf,
    pub image_tag: String,
    pub resources: usize,
    pub waves: usize,
    pub diff: TemplateDiff,
    pub validation: ValidationResult,
    /// False when the template on disk was already up to date
    pub written: bool,
    /// False when the plan on disk already matched
    pub plan_written: bool,
}

pub struct Pipeline {
    verbose: bool,
    force: bool,
}

impl Pipeline {
    pub fn new(verbose: bool) -> Self {
        Pipeline {
            verbose,
            force: false,
        }
    }

    /// Write outputs even when the template is unchanged
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The configured tag, or one derived from the build context contents
    pub fn resolve_image_tag(&self, config: &Config) -> Result<String> {
        let image = &config.app.image;
        if let Some(tag) = &image.tag {
            debug!(tag = %tag, "using configured image tag");
            return Ok(tag.clone());
        }

        // the rendered outputs may live inside the context
        let scanner = Scanner::new(image.context.clone(), image.exclude.clone())
            .with_excluded_files([&config.output.template_file, &config.output.plan_file]);
        let digest = scanner.digest().with_context(|| {
            format!(
                "Failed to hash build context: {}",
                image.context.display()
            )
        })?;

        if self.verbose {
            info!(
                files = digest.files,
                sha256 = %digest.sha256,
                "hashed build context"
            );
        }
        Ok(digest.tag())
    }

    /// Declare, resolve and validate without rendering anything
    pub fn synthesize(&self, config: &Config) -> Result<Synthesis> {
        let image_tag = self.resolve_image_tag(config)?;
        let topology = build_stack(config, &image_tag)?;
        let graph = ResourceGraph::build(&topology.stack)
            .context("Failed to resolve resource graph")?;

        let mut ctx = GeneratorContext::new(&config.stack.logical_id_prefix);
        ctx.register_stack(&topology.stack);

        let validation = validate_topology(&topology, &ctx);
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        info!(
            resources = topology.stack.len(),
            edges = graph.edge_count(),
            waves = graph.waves().len(),
            errors = validation.errors.len(),
            warnings = validation.warnings.len(),
            "validated stack"
        );

        Ok(Synthesis {
            topology,
            graph,
            ctx,
            validation,
        })
    }

    /// Build, validate, render and write the template and plan
    pub fn run(&self, config: &Config) -> Result<SynthReport> {
        let synthesis = self.synthesize(config)?;
        synthesis.ensure_valid()?;

        let stack = &synthesis.topology.stack;
        let template = generate_template(stack, &synthesis.graph, &synthesis.ctx)?;
        let template_text = to_pretty_string(&template)?;
        let plan_text = generate_plan(stack, &synthesis.graph, &synthesis.ctx);

        let template_file = &config.output.template_file;
        let plan_file = &config.output.plan_file;

        let previous = read_template(template_file)?;
        let diff = diff_templates(previous.as_ref(), &template);
        debug!(%diff, "compared with previous template");

        let written = self.force || !diff.is_empty();
        if written {
            write_file(template_file, &template_text)?;
            info!(file = %template_file.display(), "wrote template");
        } else {
            info!(file = %template_file.display(), "template unchanged");
        }

        // the plan can go missing or move on its own
        let plan_written = written || !is_current(plan_file, &plan_text)?;
        if plan_written {
            write_file(plan_file, &plan_text)?;
            info!(file = %plan_file.display(), "wrote plan");
        }

        Ok(SynthReport {
            template_file: template_file.clone(),
            plan_file: plan_file.clone(),
            image_tag: synthesis.image_tag().to_string(),
            resources: stack.len(),
            waves: synthesis.graph.waves().len(),
            diff,
            validation: synthesis.validation,
            written,
            plan_written,
        })
    }
}

/// The previously written template, if there is a readable one
fn read_template(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read template: {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "ignoring unreadable previous template");
            Ok(None)
        }
    }
}

/// Whether `path` already holds exactly `content`
fn is_current(path: &Path, content: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let existing = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(existing == content)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, content).with_context(|| format!("Failed to write file: {}", path.display()))
}
