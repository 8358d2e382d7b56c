//! Human-readable deployment plan

use std::fmt::Write;

use crate::models::{ResourceKind, Stack};
use crate::resolver::{EdgeKind, ResourceGraph};
use crate::topology::discovery::qualified_name;

use super::GeneratorContext;

/// Render the plan: resources grouped into waves that can be created in
/// parallel, followed by the image builds and stack outputs
pub fn generate_plan(stack: &Stack, graph: &ResourceGraph, ctx: &GeneratorContext) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Stack: {}", stack.name);
    if !stack.description.is_empty() {
        let _ = writeln!(out, "{}", stack.description);
    }
    let _ = writeln!(
        out,
        "{} resources in {} waves",
        stack.len(),
        graph.waves().len()
    );

    for (i, wave) in graph.waves().iter().enumerate() {
        let _ = writeln!(out, "\nWave {}:", i + 1);
        for name in wave {
            let Some(resource) = stack.get(name) else {
                continue;
            };
            let marker = if resource.kind.is_provisioned() { '+' } else { '*' };
            let _ = write!(
                out,
                "  {} {} {} ({})",
                marker,
                resource.kind.type_name(),
                name,
                ctx.logical_id(name)
            );

            let deps = graph.dependencies(name);
            if !deps.is_empty() {
                let _ = write!(out, " <- {}", deps.join(", "));
            }
            out.push('\n');
        }
    }

    let builds: Vec<_> = stack
        .filter(|k| match k {
            ResourceKind::Image(image) => Some(image),
            _ => None,
        })
        .collect();
    if !builds.is_empty() {
        let _ = writeln!(out, "\nImage builds (run before deploying):");
        for (name, image) in builds {
            let _ = writeln!(
                out,
                "  * {}: docker build --platform {} -t <{}>:{} {}",
                name,
                image.platform,
                image.repository,
                image.tag,
                image.context.display()
            );
        }
    }

    let mut registrations = Vec::new();
    let services = stack.filter(|k| match k {
        ResourceKind::Service(s) => Some(s),
        _ => None,
    });
    for (name, service) in services {
        let Some(sc) = &service.service_connect else {
            continue;
        };
        let domain = match stack.get(&sc.namespace.target).map(|r| &r.kind) {
            Some(ResourceKind::Namespace(ns)) => ns.name.as_str(),
            _ => continue,
        };
        for registration in &sc.services {
            for alias in &registration.client_aliases {
                registrations.push(format!(
                    "  {}:{} -> {}",
                    qualified_name(&alias.dns_name, domain),
                    alias.port,
                    name
                ));
            }
        }
    }
    if !registrations.is_empty() {
        let _ = writeln!(out, "\nService discovery:");
        for line in registrations {
            let _ = writeln!(out, "{}", line);
        }
    }

    if !stack.outputs.is_empty() {
        let _ = writeln!(out, "\nOutputs:");
        for output in &stack.outputs {
            let _ = writeln!(
                out,
                "  {} = {}<{}>",
                output.name, output.prefix, output.reference
            );
        }
    }

    out
}

/// Resources by wave with their direct dependencies. Ordering-only
/// dependencies are marked `(explicit)`.
pub fn generate_waves(graph: &ResourceGraph) -> String {
    let mut out = String::new();
    for (i, wave) in graph.waves().iter().enumerate() {
        let _ = writeln!(out, "Wave {}:", i + 1);
        for name in wave {
            let deps: Vec<String> = graph
                .dependencies(name)
                .into_iter()
                .map(|dep| match graph.edge_kind(dep, name) {
                    Some(EdgeKind::Explicit) => format!("{} (explicit)", dep),
                    _ => dep.to_string(),
                })
                .collect();
            if deps.is_empty() {
                let _ = writeln!(out, "  {}", name);
            } else {
                let _ = writeln!(out, "  {} <- {}", name, deps.join(", "));
            }
        }
    }
    out
}
