use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "freight",
    about = "Reproducible data pipelines over a content-addressed artifact cache",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a freight project in the current directory
    Init,
    /// Manage stage manifests
    Stage(StageArgs),
    /// Print the status of one or more stages
    #[command(aliases = ["stat", "st"])]
    Status(PathsArgs),
    /// Commit stage artifacts to the cache and write lock files
    Commit(StrategyArgs),
    /// Materialize committed artifacts in the workspace
    Checkout(StrategyArgs),
    /// Download cache objects from the configured remote
    Fetch(PathsArgs),
    /// Upload cache objects to the configured remote
    Push(PathsArgs),
    /// Remove a stage from the index (files are left alone)
    Remove(RemoveArgs),
}

#[derive(Args)]
pub struct StageArgs {
    #[command(subcommand)]
    pub action: StageAction,
}

#[derive(Subcommand)]
pub enum StageAction {
    /// Add stage manifests to the index
    Add {
        /// Stage manifest paths, relative to the workspace root
        paths: Vec<String>,
    },
    /// Generate a stage manifest skeleton on stdout
    Gen {
        /// Dependency artifact paths
        #[arg(long = "dep")]
        deps: Vec<String>,
        /// Output artifact paths
        #[arg(long = "out")]
        outs: Vec<String>,
        /// Working directory for the command
        #[arg(long)]
        work_dir: Option<String>,
        /// The command the stage runs
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
}

/// Stage paths to operate on; empty means the whole index.
#[derive(Args)]
pub struct PathsArgs {
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct StrategyArgs {
    pub paths: Vec<String>,
    /// Copy bytes instead of hard-linking cache objects
    #[arg(long)]
    pub copy: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub path: String,
}
