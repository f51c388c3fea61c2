//! Lambda packaging CLI
//!
//! Entry point for the `lambda-pack` command-line tool.

use clap::{Parser, Subcommand};
use lambda_packaging::{compute_hash, ArchiveManifest, PackageConfig, Packager};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Default config file looked up in the project root
const DEFAULT_CONFIG_FILE: &str = "lambda-pack.toml";

#[derive(Parser)]
#[command(name = "lambda-pack")]
#[command(about = "Deterministic Lambda package and layer archives", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the package archive (and layer archive if requested)
    Build {
        /// Project root (default: current directory)
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Path to config file (default: <root>/lambda-pack.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Resource name used in archive file names
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Stack name prefixed to archive file names
        #[arg(long)]
        stack: Option<String>,

        /// Include glob (repeatable, replaces configured includes)
        #[arg(long = "include", short = 'i')]
        include: Vec<String>,

        /// Exclude glob (repeatable, replaces configured excludes)
        #[arg(long = "exclude", short = 'e')]
        exclude: Vec<String>,

        /// Staging directory, relative to the root
        #[arg(long)]
        staging_dir: Option<String>,

        /// Dependency install directory, relative to the staging directory
        #[arg(long)]
        install_dir: Option<String>,

        /// Write dependencies to a separate layer archive
        #[arg(long)]
        layer: bool,
    },

    /// Print the content hash of an existing archive
    Hash {
        /// Archive to hash
        archive: PathBuf,
    },

    /// Print the canonical manifest of an existing archive as JSON
    Manifest {
        /// Archive to inspect
        archive: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            root,
            config,
            name,
            stack,
            include,
            exclude,
            staging_dir,
            install_dir,
            layer,
        } => {
            let overrides = Overrides {
                name,
                stack,
                include,
                exclude,
                staging_dir,
                install_dir,
                layer,
            };
            run_build(&root, config, overrides);
        }
        Commands::Hash { archive } => run_hash(&archive),
        Commands::Manifest { archive } => run_manifest(&archive),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// CLI values layered over the config file
struct Overrides {
    name: Option<String>,
    stack: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    staging_dir: Option<String>,
    install_dir: Option<String>,
    layer: bool,
}

impl Overrides {
    fn apply(self, config: &mut PackageConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(stack) = self.stack {
            config.stack = stack;
        }
        if !self.include.is_empty() {
            config.include = self.include;
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude;
        }
        if let Some(staging_dir) = self.staging_dir {
            config.staging_dir = staging_dir;
        }
        if let Some(install_dir) = self.install_dir {
            config.install_dir = install_dir;
        }
        if self.layer {
            config.layer = true;
        }
    }
}

fn load_config(root: &Path, config_path: Option<PathBuf>) -> Result<PackageConfig, String> {
    let path = match config_path {
        Some(path) => path,
        None => {
            let default = root.join(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(PackageConfig::default());
            }
            default
        }
    };
    PackageConfig::from_file(&path).map_err(|e| e.to_string())
}

fn run_build(root: &Path, config_path: Option<PathBuf>, overrides: Overrides) {
    let mut config = match load_config(root, config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    overrides.apply(&mut config);

    let outputs = match Packager::stage(root, config).and_then(|p| p.run()) {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&outputs) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing outputs: {}", e);
            process::exit(1);
        }
    }
}

fn run_hash(archive: &Path) {
    match compute_hash(archive) {
        Ok(hash) => println!("{}", hash),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_manifest(archive: &Path) {
    let manifest = match ArchiveManifest::from_archive(archive) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    match manifest.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing manifest: {}", e);
            process::exit(1);
        }
    }
}
