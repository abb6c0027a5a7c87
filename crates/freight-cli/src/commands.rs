use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;

use freight_artifact::{Artifact, Strategy};
use freight_cache::LocalCache;
use freight_index::{Index, IndexStatus};
use freight_stage::Stage;

use crate::cli::{Cli, Command, PathsArgs, RemoveArgs, StageAction, StageArgs, StrategyArgs};
use crate::config::Config;

const PROJECT_DIR: &str = ".freight";
const INDEX_FILE: &str = ".freight/index";
const CONFIG_FILE: &str = ".freight/config.yaml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => cmd_init(),
        Command::Stage(args) => cmd_stage(args),
        Command::Status(args) => cmd_status(args),
        Command::Commit(args) => cmd_commit(args),
        Command::Checkout(args) => cmd_checkout(args),
        Command::Fetch(args) => cmd_fetch(args),
        Command::Push(args) => cmd_push(args),
        Command::Remove(args) => cmd_remove(args),
    }
}

/// The workspace root. Commands run from the directory holding `.freight/`.
fn root_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("determine current directory")
}

struct Project {
    root: PathBuf,
    config: Config,
    cache: LocalCache,
    index: Index,
}

fn open_project() -> anyhow::Result<Project> {
    let root = root_dir()?;
    if !root.join(PROJECT_DIR).is_dir() {
        bail!("no {PROJECT_DIR} directory here; run `freight init` first");
    }
    let config = Config::load(&root.join(CONFIG_FILE))?;
    let cache = LocalCache::new(root.join(&config.cache))?;
    let index = Index::load(&root.join(INDEX_FILE))?;
    Ok(Project {
        root,
        config,
        cache,
        index,
    })
}

/// The stage paths a command operates on: its arguments, or the entire
/// index when none are given.
fn target_paths(index: &Index, paths: Vec<String>) -> Vec<String> {
    if paths.is_empty() {
        index.stage_paths().map(String::from).collect()
    } else {
        paths
    }
}

fn strategy(copy: bool) -> Strategy {
    if copy {
        Strategy::Copy
    } else {
        Strategy::Link
    }
}

fn cmd_init() -> anyhow::Result<()> {
    let root = root_dir()?;
    fs::create_dir_all(root.join(PROJECT_DIR).join("cache"))
        .context("create project directory")?;
    let index_path = root.join(INDEX_FILE);
    if !index_path.exists() {
        Index::new().save(&index_path)?;
    }
    println!(
        "{} Initialized freight project in {}",
        "✓".green().bold(),
        root.display().to_string().bold()
    );
    Ok(())
}

fn cmd_stage(args: StageArgs) -> anyhow::Result<()> {
    match args.action {
        StageAction::Add { paths } => {
            let mut project = open_project()?;
            project
                .index
                .add_stages_from_paths(&project.root, paths.iter().map(String::as_str))?;
            project.index.save(&project.root.join(INDEX_FILE))?;
            for path in &paths {
                println!("  {} {}", "added:".green(), path);
            }
            Ok(())
        }
        StageAction::Gen {
            deps,
            outs,
            work_dir,
            command,
        } => cmd_stage_gen(deps, outs, work_dir, command),
    }
}

fn cmd_stage_gen(
    deps: Vec<String>,
    outs: Vec<String>,
    work_dir: Option<String>,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let mut stage = Stage {
        working_dir: work_dir.unwrap_or_default(),
        command: command.join(" "),
        ..Default::default()
    };
    for dep in deps {
        stage
            .dependencies
            .insert(dep.clone(), Artifact::new_file(dep));
    }
    for out in outs {
        stage.outputs.insert(out.clone(), Artifact::new_file(out));
    }
    stage.validate()?;
    print!("{}", stage.to_yaml()?);
    Ok(())
}

fn cmd_status(args: PathsArgs) -> anyhow::Result<()> {
    let mut project = open_project()?;
    let targets = target_paths(&project.index, args.paths);

    let mut out = IndexStatus::new();
    for path in &targets {
        let mut in_progress = HashSet::new();
        project
            .index
            .status(path, &project.cache, &project.root, &mut out, &mut in_progress)?;
    }

    for (path, stage_status) in &out {
        let locked = project.index.get(path).map(|e| e.is_locked).unwrap_or(false);
        println!("{}  (lock file up-to-date: {})", path.bold(), locked);
        for (art_path, art_status) in stage_status {
            let phrase = art_status.to_string();
            let colored_phrase = match phrase.as_str() {
                "up-to-date" => phrase.green(),
                "uncommitted" => phrase.yellow(),
                _ => phrase.red(),
            };
            println!("  {art_path}  {colored_phrase}");
        }
    }
    Ok(())
}

fn cmd_commit(args: StrategyArgs) -> anyhow::Result<()> {
    let mut project = open_project()?;
    let strat = strategy(args.copy);
    let targets = target_paths(&project.index, args.paths);

    let mut committed = Vec::new();
    for path in &targets {
        let mut in_progress = HashSet::new();
        project.index.commit(
            path,
            &project.cache,
            &project.root,
            strat,
            &mut committed,
            &mut in_progress,
        )?;
    }
    project.index.save(&project.root.join(INDEX_FILE))?;
    for path in &committed {
        println!("  {} {}", "committed:".green(), path);
    }
    Ok(())
}

fn cmd_checkout(args: StrategyArgs) -> anyhow::Result<()> {
    let mut project = open_project()?;
    let strat = strategy(args.copy);
    let targets = target_paths(&project.index, args.paths);

    let mut done = Vec::new();
    for path in &targets {
        let mut in_progress = HashSet::new();
        project.index.checkout(
            path,
            &project.cache,
            &project.root,
            strat,
            &mut done,
            &mut in_progress,
        )?;
    }
    for path in &done {
        println!("  {} {}", "checked out:".green(), path);
    }
    Ok(())
}

fn cmd_fetch(args: PathsArgs) -> anyhow::Result<()> {
    let project = open_project()?;
    let (remote, artifacts) = transfer_set(&project, args.paths)?;
    project
        .cache
        .fetch(&remote, &project.config.sync_tool, &artifacts)?;
    println!("{} Fetched {} artifacts", "✓".green(), artifacts.len());
    Ok(())
}

fn cmd_push(args: PathsArgs) -> anyhow::Result<()> {
    let project = open_project()?;
    let (remote, artifacts) = transfer_set(&project, args.paths)?;
    project
        .cache
        .push(&remote, &project.config.sync_tool, &artifacts)?;
    println!("{} Pushed {} artifacts", "✓".green(), artifacts.len());
    Ok(())
}

/// The remote spec and the artifacts of the targeted stages.
fn transfer_set(project: &Project, paths: Vec<String>) -> anyhow::Result<(String, Vec<Artifact>)> {
    let Some(remote) = project.config.remote.clone() else {
        bail!("no remote configured; set `remote` in {CONFIG_FILE}");
    };
    let mut artifacts = Vec::new();
    for path in target_paths(&project.index, paths) {
        let entry = project
            .index
            .get(&path)
            .with_context(|| format!("stage {path} is not in the index"))?;
        artifacts.extend(entry.stage.artifacts().cloned());
    }
    Ok((remote, artifacts))
}

fn cmd_remove(args: RemoveArgs) -> anyhow::Result<()> {
    let mut project = open_project()?;
    project.index.remove(&args.path)?;
    project.index.save(&project.root.join(INDEX_FILE))?;
    println!("  {} {}", "removed:".red(), args.path);
    Ok(())
}
