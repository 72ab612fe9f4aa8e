use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use log::{debug, LevelFilter};
use relic_core::{
    Encoding, FileSectorSource, FilesystemRegistry, MountOptions, Partition, ReadOnlyFilesystem, SectorSource,
};
use relic_filesystems::builtin_registry;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

const CHUNK: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "relic")]
#[command(about = "Identify and inspect legacy filesystem images", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ImageArgs {
    /// Raw disk or partition image
    image: PathBuf,
    /// Bytes per sector of the medium
    #[arg(long, default_value_t = 512)]
    sector_size: u32,
    /// First sector of the partition
    #[arg(long)]
    start: Option<u64>,
    /// Last sector of the partition, inclusive
    #[arg(long)]
    end: Option<u64>,
}

#[derive(Args)]
struct MountArgs {
    #[command(flatten)]
    image: ImageArgs,
    /// Descriptor to mount with instead of the first one that can
    #[arg(short, long)]
    filesystem: Option<String>,
    /// Mount option as key=value (e.g. encoding=koi8-r)
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the filesystem(s) on an image and describe them
    Probe {
        #[command(flatten)]
        image: ImageArgs,
        /// Text encoding for labels and names
        #[arg(short, long)]
        encoding: Option<String>,
        /// Print normalized metadata as JSON
        #[arg(long)]
        json: bool,
        /// Run the descriptors in parallel
        #[arg(long)]
        concurrent: bool,
    },
    /// List the built-in descriptors
    List,
    /// List a directory of a mountable volume
    Ls {
        #[command(flatten)]
        mount: MountArgs,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Write a file of a mountable volume to stdout
    Cat {
        #[command(flatten)]
        mount: MountArgs,
        path: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

impl ImageArgs {
    fn open(&self) -> anyhow::Result<(FileSectorSource, Partition)> {
        let source = FileSectorSource::open(&self.image, self.sector_size)
            .with_context(|| format!("cannot open {}", self.image.display()))?;
        let partition = select_partition(&source, self.start, self.end)?;
        Ok((source, partition))
    }
}

fn select_partition(source: &dyn SectorSource, start: Option<u64>, end: Option<u64>) -> anyhow::Result<Partition> {
    let info = source.info();
    let whole = Partition::whole(&info);
    let partition = Partition::new(start.unwrap_or(whole.start), end.unwrap_or(whole.end));
    if partition.is_empty() || partition.end > whole.end {
        bail!(
            "partition {}..={} does not fit a medium of {} sectors ({} bytes)",
            partition.start,
            partition.end,
            info.total_sectors,
            info.total_bytes()
        );
    }
    Ok(partition)
}

fn probe(
    registry: &FilesystemRegistry,
    image: &ImageArgs,
    encoding: Option<String>,
    json: bool,
    concurrent: bool,
) -> anyhow::Result<()> {
    let encoding = encoding
        .map(|name| name.parse::<Encoding>())
        .transpose()
        .context("invalid --encoding")?;
    let (source, partition) = image.open()?;

    let report = if concurrent {
        registry.probe_concurrent(&source, &partition)
    } else {
        registry.probe(&source, &partition)
    };
    for failure in &report.failures {
        eprintln!("{} could not probe the image: {}", failure.name, failure.error);
    }

    let mut described = Vec::new();
    for fs in &report.matches {
        match fs.get_information(&source, &partition, encoding) {
            Ok(info) => described.push((fs.name(), info)),
            Err(e) => eprintln!("{} could not describe the image: {}", fs.name(), e),
        }
    }

    if json {
        let entries: Vec<_> = described
            .iter()
            .map(|(name, info)| {
                serde_json::json!({
                    "filesystem": name,
                    "metadata": info.metadata,
                    "report": info.report.lines(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if described.is_empty() {
        println!("No known filesystem found.");
    } else {
        for (name, info) in &described {
            println!("{}:", name);
            for line in info.report.lines() {
                println!("  {}", line);
            }
            println!();
        }
    }
    Ok(())
}

fn mount(registry: &FilesystemRegistry, args: &MountArgs) -> anyhow::Result<Box<dyn ReadOnlyFilesystem>> {
    let (source, partition) = args.image.open()?;
    let source: Arc<dyn SectorSource + Send + Sync> = Arc::new(source);
    let options = MountOptions::parse(args.options.iter().map(String::as_str));

    let candidates = match &args.filesystem {
        Some(name) => vec![registry
            .get(name)
            .ok_or_else(|| anyhow!("unknown filesystem '{}'; see 'relic list'", name))?],
        None => registry.probe(source.as_ref(), &partition).matches,
    };

    for fs in candidates {
        let Some(mut handle) = fs.read_only() else {
            debug!("{} offers no file access", fs.name());
            continue;
        };
        match handle.mount(Arc::clone(&source), partition, &options) {
            Ok(()) => return Ok(handle),
            Err(e) if e.is_unsupported() => debug!("{} cannot mount: {}", fs.name(), e),
            Err(e) => return Err(e).with_context(|| format!("{} failed to mount the image", fs.name())),
        }
    }
    bail!("no filesystem on {} supports file access", args.image.image.display())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = builtin_registry()?;

    match cli.command {
        Commands::Probe { image, encoding, json, concurrent } => {
            probe(&registry, &image, encoding, json, concurrent)?;
        }
        Commands::List => {
            println!("Built-in filesystems (probing order):\n");
            for fs in registry.list() {
                let access = if fs.read_only().is_some() { "" } else { " (identify only)" };
                println!("  {:<40} {}{}", fs.name(), fs.id(), access);
            }
        }
        Commands::Ls { mount: args, path } => {
            let mut fs = mount(&registry, &args)?;
            for entry in fs.read_dir(&path).with_context(|| format!("cannot list {}", path))? {
                let modified = entry
                    .attributes
                    .modified
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>10} {:>10} {}", entry.attributes.size, modified, entry.name);
            }
            fs.unmount()?;
        }
        Commands::Cat { mount: args, path } => {
            let mut fs = mount(&registry, &args)?;
            let mut stdout = std::io::stdout().lock();
            let mut offset = 0u64;
            loop {
                let chunk = fs.read(&path, offset, CHUNK).with_context(|| format!("cannot read {}", path))?;
                if chunk.is_empty() {
                    break;
                }
                stdout.write_all(&chunk)?;
                offset += chunk.len() as u64;
            }
            stdout.flush()?;
            fs.unmount()?;
        }
    }

    Ok(())
}
