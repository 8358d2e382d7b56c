//! novella-infra - typed resource graph for the Novella AWS stack
//!
//! Declares the network, security boundary, service discovery, load balancer,
//! image pipeline, Fargate workloads and EFS storage of the Novella
//! application, resolves them into a dependency DAG, validates the plan and
//! renders a CloudFormation-format template.

pub mod config;
pub mod diff;
pub mod generator;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod topology;
pub mod utils;
pub mod validation;
