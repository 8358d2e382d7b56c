mod cli;

use anyhow::Result;
use cli::{Cli, Commands};
use novella_infra::config::Config;
use novella_infra::generator::plan::generate_waves;
use novella_infra::pipeline::Pipeline;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter = if cli.verbose() { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Synth {
            config,
            verbose,
            force,
        } => {
            run_synth(&config, verbose, force)?;
        }
        Commands::Validate { config, verbose } => {
            run_validate(&config, verbose)?;
        }
        Commands::Graph { config } => {
            run_graph(&config)?;
        }
        Commands::Init { output, force } => {
            run_init(&output, force)?;
        }
    }

    Ok(())
}

/// Run the synth command
fn run_synth(config_path: &Path, verbose: bool, force: bool) -> Result<()> {
    let config = Config::load(config_path)?;

    if verbose {
        println!("Loaded configuration from: {}", config_path.display());
    }

    let report = Pipeline::new(verbose).with_force(force).run(&config)?;

    println!(
        "Stack '{}': {} resources in {} waves, image tag {}",
        config.stack.name, report.resources, report.waves, report.image_tag
    );
    for warning in &report.validation.warnings {
        println!("warning: {}", warning);
    }

    if report.diff.is_empty() {
        println!("No changes.");
    } else {
        println!("{}", report.diff);
    }

    if report.written {
        println!("Generated: {}", report.template_file.display());
    }
    if report.plan_written {
        println!("Generated: {}", report.plan_file.display());
    }

    Ok(())
}

/// Run the validate command
fn run_validate(config_path: &Path, verbose: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let synthesis = Pipeline::new(verbose).synthesize(&config)?;
    let validation = &synthesis.validation;

    for error in &validation.errors {
        println!("error: {}", error);
    }
    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }

    synthesis.ensure_valid()?;

    if validation.has_warnings() {
        println!(
            "Valid: {} resources, {} warning(s)",
            synthesis.topology.stack.len(),
            validation.warnings.len()
        );
    } else {
        println!("Valid: {} resources", synthesis.topology.stack.len());
    }
    Ok(())
}

/// Run the graph command
fn run_graph(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let synthesis = Pipeline::new(false).synthesize(&config)?;
    print!("{}", generate_waves(&synthesis.graph));
    Ok(())
}

/// Run the init command
fn run_init(output_path: &Path, force: bool) -> Result<()> {
    Config::init(output_path, force)?;

    println!("Created configuration file: {}", output_path.display());
    println!("\nEdit the file to configure:");
    println!("  - network.cidr_block / zone_count: VPC layout");
    println!("  - app.image.context: Directory the application image is built from");
    println!("  - app.secrets / database.secrets: Parameter names holding credentials");
    println!("  - output.template_file: Where to write the rendered template");

    Ok(())
}
