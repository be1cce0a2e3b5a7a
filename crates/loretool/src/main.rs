use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use loretool_core::config::{LoreConfig, load_config, verify_passcode};
use loretool_core::document::{Item, Manifest};
use loretool_core::items;
use loretool_core::manifest::{MANIFEST_DOCUMENT, ManifestSession};
use loretool_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_runtime_ready,
    init_layout, inspect_runtime, resolve_paths,
};
use loretool_core::session::EditingSession;
use loretool_core::store::{ContentStore, FsStore, load_document};
use loretool_core::tree::{Direction, TreePath};
use loretool_core::viewer;

#[derive(Debug, Parser)]
#[command(
    name = "loretool",
    version,
    about = "File-backed world wiki: category tree editor and viewer"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Editor passcode for commands that write documents")]
    passcode: Option<String>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    passcode: Option<String>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            passcode: cli.passcode.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Status,
    World(WorldArgs),
    Category(CategoryArgs),
    Theme(ThemeArgs),
    Item(ItemArgs),
    Items(ItemsArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite existing manifest/config files")]
    force: bool,
    #[arg(long, help = "Skip writing .loretool/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct WorldArgs {
    #[command(subcommand)]
    command: WorldSubcommand,
}

#[derive(Debug, Subcommand)]
enum WorldSubcommand {
    List,
    Add {
        name: String,
    },
    Remove {
        id: String,
        #[arg(long, help = "Archive and delete the world folder on disk")]
        delete_files: bool,
    },
    Rename {
        id: String,
        new_name: String,
    },
    #[command(name = "set-name")]
    SetName {
        id: String,
        name: String,
    },
    Hide {
        id: String,
    },
    Show {
        id: String,
    },
    Reorder {
        id: String,
        direction: MoveDirection,
    },
    #[command(about = "Recreate missing files for a listed world")]
    Scaffold {
        id: String,
    },
}

#[derive(Debug, Args)]
struct CategoryArgs {
    #[command(subcommand)]
    command: CategorySubcommand,
}

#[derive(Debug, Subcommand)]
enum CategorySubcommand {
    List {
        world: String,
    },
    Add {
        world: String,
        name: String,
        #[arg(long, value_name = "PATH", help = "Parent category path like A/B")]
        parent: Option<String>,
    },
    Rename {
        world: String,
        path: String,
        new_name: String,
    },
    Set {
        world: String,
        path: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_name = "URL")]
        items_url: String,
    },
    Remove {
        world: String,
        path: String,
    },
    Move {
        world: String,
        source: String,
        target: String,
    },
    Reorder {
        world: String,
        path: String,
        direction: MoveDirection,
    },
}

#[derive(Debug, Args)]
struct ThemeArgs {
    #[command(subcommand)]
    command: ThemeSubcommand,
}

#[derive(Debug, Subcommand)]
enum ThemeSubcommand {
    List,
    Set { world: String, theme: String },
}

#[derive(Debug, Args)]
struct ItemArgs {
    #[command(subcommand)]
    command: ItemSubcommand,
}

#[derive(Debug, Subcommand)]
enum ItemSubcommand {
    Add {
        world: String,
        category: String,
        name: String,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long, default_value = "", value_name = "TEXT")]
        full_data: String,
    },
    Set {
        world: String,
        category: String,
        name: String,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long, value_name = "TEXT")]
        full_data: Option<String>,
    },
    Remove {
        world: String,
        category: String,
        name: String,
    },
}

#[derive(Debug, Args)]
struct ItemsArgs {
    world: String,
    category: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(direction: MoveDirection) -> Self {
        match direction {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::World(WorldArgs { command })) => run_world(&runtime, command),
        Some(Commands::Category(CategoryArgs { command })) => run_category(&runtime, command),
        Some(Commands::Theme(ThemeArgs { command })) => run_theme(&runtime, command),
        Some(Commands::Item(ItemArgs { command })) => run_item(&runtime, command),
        Some(Commands::Items(ItemsArgs { world, category })) => {
            run_items(&runtime, &world, &category)
        }
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized loretool runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("manifest_path: {}", normalize_path(&paths.manifest_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_manifest: {}", report.wrote_manifest);
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("manifest_exists: {}", format_flag(status.manifest_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!(
        "backups_dir_exists: {}",
        format_flag(status.backups_dir_exists)
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "world_count: {}",
        status
            .world_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_world(runtime: &RuntimeOptions, command: WorldSubcommand) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;
    let store = open_store(&paths);

    if let WorldSubcommand::List = command {
        let manifest: Manifest = load_document(&store, MANIFEST_DOCUMENT)?;
        println!("worlds: {}", manifest.worlds.len());
        for entry in &manifest.worlds {
            let marker = match entry.needs_scaffolding {
                Some(true) => " (unsaved)",
                Some(false) => " (hidden)",
                None => "",
            };
            println!("  {}{marker}  {}", entry.id, entry.path);
        }
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    let config = load_runtime_config(&paths)?;
    verify_passcode(&config, runtime.passcode.as_deref())?;

    let mut session = ManifestSession::open(&store)?;
    match command {
        WorldSubcommand::List => unreachable!(),
        WorldSubcommand::Add { name } => {
            let id = session.add_world(&name)?;
            session.save(&store)?;
            println!("added world: {id}");
        }
        WorldSubcommand::Remove { id, delete_files } => {
            session.remove_world(&id, delete_files)?;
            session.save(&store)?;
            println!("removed world: {id}");
            println!("deleted_files: {delete_files}");
        }
        WorldSubcommand::Rename { id, new_name } => {
            let new_id = session.rename_world(&id, &new_name)?;
            session.save(&store)?;
            println!("renamed world: {id} -> {new_id}");
        }
        WorldSubcommand::SetName { id, name } => {
            let document_path = world_document(&store, &id)?;
            let mut world_session = EditingSession::open(&store, &id, &document_path)?;
            world_session.set_name(&name)?;
            world_session.save(&store)?;
            println!("world: {id}");
            println!("name: {name}");
        }
        WorldSubcommand::Hide { id } => {
            session.set_hidden(&id, true)?;
            session.save(&store)?;
            println!("hidden world: {id}");
        }
        WorldSubcommand::Show { id } => {
            session.set_hidden(&id, false)?;
            session.save(&store)?;
            println!("visible world: {id}");
        }
        WorldSubcommand::Reorder { id, direction } => {
            session.reorder(&id, direction.into())?;
            session.save(&store)?;
            println!("reordered world: {id}");
        }
        WorldSubcommand::Scaffold { id } => {
            let entry = session
                .manifest()
                .entry(&id)
                .with_context(|| format!("no world with id {id:?} in the manifest"))?;
            store.scaffold_world(&entry.id, &entry.path)?;
            println!("scaffolded world: {id}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_category(runtime: &RuntimeOptions, command: CategorySubcommand) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;
    let store = open_store(&paths);

    if let CategorySubcommand::List { world } = &command {
        let document_path = world_document(&store, world)?;
        let session = EditingSession::open(&store, world, &document_path)?;
        println!("world: {}", session.world().name);
        println!("theme: {}", session.world().theme);
        for row in viewer::outline(session.world()) {
            let indent = "  ".repeat(row.level);
            let kind = if row.is_leaf { "leaf" } else { "branch" };
            println!("  {indent}{} [{kind}]", row.name());
        }
        print_diagnostics(runtime, &paths);
        return Ok(());
    }

    let config = load_runtime_config(&paths)?;
    verify_passcode(&config, runtime.passcode.as_deref())?;

    let world_id = match &command {
        CategorySubcommand::List { world }
        | CategorySubcommand::Add { world, .. }
        | CategorySubcommand::Rename { world, .. }
        | CategorySubcommand::Set { world, .. }
        | CategorySubcommand::Remove { world, .. }
        | CategorySubcommand::Move { world, .. }
        | CategorySubcommand::Reorder { world, .. } => world.clone(),
    };
    let document_path = world_document(&store, &world_id)?;
    let mut session = EditingSession::open(&store, &world_id, &document_path)?;

    match command {
        CategorySubcommand::List { .. } => unreachable!(),
        CategorySubcommand::Add { name, parent, .. } => {
            let added = match parent {
                Some(parent) => {
                    let parent_path = parse_tree_path(&parent)?;
                    session.add_child(&parent_path, &name)?
                }
                None => session.add_top_level(&name)?,
            };
            let report = session.save(&store)?;
            println!("added category: {added}");
            for asset in &report.created_assets {
                println!("created_asset: {asset}");
            }
        }
        CategorySubcommand::Rename {
            path, new_name, ..
        } => {
            let old_path = parse_tree_path(&path)?;
            let renamed = session.rename(&old_path, &new_name)?;
            session.save(&store)?;
            println!("renamed category: {old_path} -> {renamed}");
        }
        CategorySubcommand::Set {
            path,
            description,
            items_url,
            ..
        } => {
            let leaf_path = parse_tree_path(&path)?;
            session.update_leaf_fields(&leaf_path, &description, &items_url)?;
            session.save(&store)?;
            println!("updated category: {leaf_path}");
        }
        CategorySubcommand::Remove { path, .. } => {
            let target = parse_tree_path(&path)?;
            session.remove(&target)?;
            session.save(&store)?;
            println!("removed category: {target}");
        }
        CategorySubcommand::Move { source, target, .. } => {
            let source_path = parse_tree_path(&source)?;
            let target_path = parse_tree_path(&target)?;
            session.move_node(&source_path, &target_path)?;
            session.save(&store)?;
            println!("moved category: {source_path} onto {target_path}");
        }
        CategorySubcommand::Reorder {
            path, direction, ..
        } => {
            let target = parse_tree_path(&path)?;
            session.reorder(&target, direction.into())?;
            session.save(&store)?;
            println!("reordered category: {target}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_theme(runtime: &RuntimeOptions, command: ThemeSubcommand) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_runtime_config(&paths)?;

    match command {
        ThemeSubcommand::List => {
            println!("themes: {}", config.themes().len());
            for theme in config.themes() {
                println!("  {theme}");
            }
        }
        ThemeSubcommand::Set { world, theme } => {
            let status = inspect_runtime(&paths)?;
            ensure_runtime_ready(&paths, &status)?;
            verify_passcode(&config, runtime.passcode.as_deref())?;
            if !config.is_valid_theme(&theme) {
                bail!(
                    "unknown theme {theme:?}; run `loretool theme list` for the available set"
                );
            }
            let store = open_store(&paths);
            let document_path = world_document(&store, &world)?;
            let mut session = EditingSession::open(&store, &world, &document_path)?;
            session.set_theme(&theme)?;
            session.save(&store)?;
            println!("world: {world}");
            println!("theme: {theme}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_item(runtime: &RuntimeOptions, command: ItemSubcommand) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;
    let store = open_store(&paths);

    let config = load_runtime_config(&paths)?;
    verify_passcode(&config, runtime.passcode.as_deref())?;

    let (world_id, category) = match &command {
        ItemSubcommand::Add { world, category, .. }
        | ItemSubcommand::Set { world, category, .. }
        | ItemSubcommand::Remove { world, category, .. } => (world.clone(), category.clone()),
    };
    let document_path = world_document(&store, &world_id)?;
    let session = EditingSession::open(&store, &world_id, &document_path)?;
    let (path, leaf) = viewer::find_leaf(session.world(), &category)?;

    match command {
        ItemSubcommand::Add {
            name,
            summary,
            full_data,
            ..
        } => {
            items::add_item(
                &store,
                leaf,
                Item {
                    name: name.clone(),
                    summary,
                    full_data,
                    sidebar: None,
                    galleries: None,
                },
            )?;
            println!("added item: {name}");
            println!("category: {path}");
        }
        ItemSubcommand::Set {
            name,
            summary,
            full_data,
            ..
        } => {
            items::update_item(&store, leaf, &name, summary.as_deref(), full_data.as_deref())?;
            println!("updated item: {name}");
            println!("category: {path}");
        }
        ItemSubcommand::Remove { name, .. } => {
            items::remove_item(&store, leaf, &name)?;
            println!("removed item: {name}");
            println!("category: {path}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_items(runtime: &RuntimeOptions, world_id: &str, category: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    ensure_runtime_ready(&paths, &status)?;
    let store = open_store(&paths);

    let document_path = world_document(&store, world_id)?;
    let session = EditingSession::open(&store, world_id, &document_path)?;
    let (path, leaf) = viewer::find_leaf(session.world(), category)?;
    let items = viewer::load_items(&store, leaf)?;

    println!("world: {world_id}");
    println!("category: {path}");
    println!("items: {}", items.len());
    for item in &items {
        if item.summary.is_empty() {
            println!("  {}", item.name);
        } else {
            println!("  {}: {}", item.name, item.summary);
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn world_document(store: &FsStore, world_id: &str) -> Result<String> {
    let manifest: Manifest = load_document(store, MANIFEST_DOCUMENT)?;
    let entry = manifest
        .entry(world_id)
        .with_context(|| format!("no world with id {world_id:?} in the manifest"))?;
    if entry.needs_scaffolding == Some(true) {
        bail!("world {world_id:?} has not been saved yet; save the manifest first");
    }
    Ok(entry.path.clone())
}

fn parse_tree_path(raw: &str) -> Result<TreePath> {
    let segments: Vec<String> = raw
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    TreePath::new(segments)
        .with_context(|| format!("invalid category path {raw:?}; expected up to 3 segments like A/B/C"))
}

fn load_runtime_config(paths: &ResolvedPaths) -> Result<LoreConfig> {
    load_config(&paths.config_path)
}

fn open_store(paths: &ResolvedPaths) -> FsStore {
    FsStore::new(paths.project_root.clone(), paths.backups_dir.clone())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
