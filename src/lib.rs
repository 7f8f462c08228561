//! # nagstack - a workshop stack that passes cdk-nag
//!
//! nagstack declares a single-instance AWS workshop environment, checks it
//! against the AwsSolutions rule pack and synthesizes a CloudFormation cloud
//! assembly that the `cdk` CLI can deploy.
//!
//! ## Core Concepts
//!
//! - **App / Stack**: the construct tree; every resource has a path and a
//!   logical id derived from it
//! - **Resources**: typed builders for the VPC, security groups, IAM role and
//!   EC2 instance, returning handles used by later declarations
//! - **Aspects**: visitors applied to every construct before synthesis
//! - **NagPack**: the AwsSolutions rules, run as an aspect, with suppressions
//!   recorded in resource metadata
//! - **Synthesis**: template, manifest, tree and nag reports written to `cdk.out`
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CLI Interface                         │
//! │          (clap: synth | nag | graph | list, Settings)        │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        WorkshopStack                         │
//! │    (Vpc, SecurityGroup, Role, Instance, suppressions, output)│
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//! ┌─────────────────┐  ┌───────────────────┐  ┌──────────────────┐
//! │ Construct tree  │  │  NagPack aspect   │  │ Dependency graph │
//! │ (paths, ids,    │  │  (rules, reports, │  │   (petgraph)     │
//! │  annotations)   │  │   suppressions)   │  │                  │
//! └─────────────────┘  └───────────────────┘  └──────────────────┘
//!          │                     │                     │
//!          └─────────────────────┼─────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Synthesizer                          │
//! │     (<Stack>.template.json, manifest.json, tree.json)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use nagstack::prelude::*;
//!
//! fn main() -> nagstack::Result<()> {
//!     let mut app = App::new();
//!     app.add_aspect(AwsSolutionsChecks::new(NagPackOptions::default()));
//!
//!     WorkshopStack::new(
//!         &mut app,
//!         "NaggingCanBeGoodStack",
//!         WorkshopStackProps {
//!             stack: StackProps::default(),
//!             ssh_pub_key: "ssh-ed25519 AAAA... user@host".to_string(),
//!         },
//!     )?;
//!
//!     app.synth("cdk.out")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod construct;
pub mod error;
pub mod logging;
pub mod nag;
pub mod resources;
pub mod synth;
pub mod template;
pub mod workshop;

pub use error::{Error, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, Environment, Settings};
    pub use crate::construct::{
        Annotation, AnnotationLevel, App, Aspect, Construct, NodeId, Stack, StackProps,
    };
    pub use crate::error::{Error, Result};
    pub use crate::nag::{
        add_resource_suppressions, AwsSolutionsChecks, NagPack, NagPackOptions,
        NagPackSuppression, ReportFormat, SuppressionTarget,
    };
    pub use crate::synth::{CloudAssembly, SynthOptions, Synthesizer};
    pub use crate::template::{CfnOutput, CfnResource, Template};
    pub use crate::workshop::{build_app, WorkshopStack, WorkshopStackProps};
}
