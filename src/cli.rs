use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "spacectx",
    version,
    about = "Browse Upbound spaces, groups and control planes and point your kubeconfig at one."
)]
pub struct CliArgs {
    /// Upbound profile to use (defaults to UP_PROFILE, then the configured default)
    #[arg(long)]
    pub profile: Option<String>,

    /// kubeconfig file to read and update
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline in milliseconds for resolving each cloud space ingress
    #[arg(long, default_value_t = 10_000)]
    pub ingress_timeout_ms: u64,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Manage the CloudNativePG operator a space hub depends on
    Cnpg {
        /// kubeconfig context of the hub cluster
        #[arg(long)]
        context: Option<String>,

        #[command(subcommand)]
        action: PrerequisiteAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum PrerequisiteAction {
    /// Install the operator unless it is already present
    Install,
    /// Report whether the operator is installed
    Status,
}
