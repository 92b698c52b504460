use anyhow::Context;
use capfs::host::DirectoryHandle;
use capfs::host::localfs::LocalDir;
use capfs::host::memory::MemoryHost;
use capfs::vfs::demo;
use capfs::{CapFs, CapFsConfig, Listing, ReadOptions, ReaddirOptions};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capfs")]
#[command(about = "POSIX-style file operations over a capability-handle store", long_about = None)]
struct Cli {
    /// Directory to serve as the store root; an in-memory store is used if omitted
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// YAML file with adapter settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log every operation, its result and failures
    #[arg(long)]
    trace: bool,

    /// Always use copy-on-close writes, even if sync access is available
    #[arg(long)]
    no_sync_access: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List a directory")]
    Ls {
        path: String,
        #[arg(short, long, help = "Show entry kinds")]
        long: bool,
    },
    #[command(about = "Print a file")]
    Cat { path: String },
    #[command(about = "Write TEXT to a file, creating parents")]
    Put { path: String, text: String },
    #[command(about = "Create a directory and its parents")]
    Mkdir { path: String },
    #[command(about = "Remove a file")]
    Rm { path: String },
    #[command(about = "Remove a directory recursively; `/` empties the store")]
    Rmdir { path: String },
    #[command(about = "Move a file")]
    Mv { old: String, new: String },
    #[command(about = "Show metadata")]
    Stat { path: String },
    #[command(about = "Show the size of an entry")]
    Du { path: String },
    #[command(about = "Run the end-to-end walkthrough; with --root it runs on disk")]
    Demo,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = try_main(cli).await {
        eprintln!("capfs: {e:#}");
        std::process::exit(1);
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => CapFsConfig::load(path)?,
        None => CapFsConfig::default(),
    };
    if cli.trace {
        config.trace = true;
    }
    if cli.no_sync_access {
        config.prefer_sync_access = false;
    }

    let default_filter = if config.trace { "capfs=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let (Commands::Demo, Some(dir)) = (&cli.command, &cli.root) {
        for line in demo::localfs_demo(dir, config).await? {
            println!("{line}");
        }
        return Ok(());
    }

    match &cli.root {
        Some(dir) => {
            let root = LocalDir::open(dir)
                .await
                .with_context(|| format!("cannot open store root {}", dir.display()))?;
            run(CapFs::new(root, config), cli.command).await
        }
        None => {
            let host = MemoryHost::new();
            run(CapFs::new(host.root(), config), cli.command).await
        }
    }
}

async fn run<D: DirectoryHandle>(fs: CapFs<D>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ls { path, long } => {
            let opts = ReaddirOptions { with_file_types: long };
            match fs.readdir(&path, opts).await? {
                Listing::Names(names) => names.iter().for_each(|n| println!("{n}")),
                Listing::Entries(entries) => {
                    for e in entries {
                        let tag = if e.is_directory() { "d" } else { "-" };
                        println!("{tag} {}", e.name);
                    }
                }
            }
        }
        Commands::Cat { path } => {
            let contents = fs.read_file(&path, ReadOptions::default()).await?;
            let mut out = std::io::stdout().lock();
            out.write_all(contents.as_bytes())?;
            out.flush()?;
        }
        Commands::Put { path, text } => fs.write_file(&path, text).await?,
        Commands::Mkdir { path } => fs.mkdir(&path).await?,
        Commands::Rm { path } => fs.unlink(&path).await?,
        Commands::Rmdir { path } => fs.rmdir(&path).await?,
        Commands::Mv { old, new } => fs.rename(&old, &new).await?,
        Commands::Stat { path } => {
            let st = fs.stat(&path).await?;
            let kind = if st.is_directory() { "directory" } else { "file" };
            println!("type:  {kind}");
            println!("size:  {}", st.size);
            println!("mode:  {:o}", st.mode);
            println!("mtime: {} ms", st.mtime_ms);
        }
        Commands::Du { path } => {
            let usage = fs.du(&path).await?;
            println!("{}\t{}", usage.size, usage.path);
        }
        Commands::Demo => {
            for line in demo::walkthrough(&fs).await? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
