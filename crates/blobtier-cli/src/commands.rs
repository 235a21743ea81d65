use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use blobtier_remote::HttpOrigin;
use blobtier_store::{BlobStore, LayeredStore, MemoryBlobStore, SqliteBlobStore};
use colored::Colorize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::cli::*;
use crate::config::{BackendKind, CliConfig};

/// Store opened for one command invocation.
struct Opened {
    /// What commands read and write through: the local store, wrapped in a
    /// layered store when a remote is configured.
    store: Arc<dyn BlobStore>,
    /// The SQLite backend, when in use, for record-level introspection.
    sqlite: Option<Arc<SqliteBlobStore>>,
    layered: Option<Arc<LayeredStore<Arc<dyn BlobStore>, HttpOrigin>>>,
}

async fn open_store(config: &CliConfig) -> anyhow::Result<Opened> {
    let (local, sqlite): (Arc<dyn BlobStore>, _) = match config.backend {
        BackendKind::Memory => (Arc::new(MemoryBlobStore::new()) as Arc<dyn BlobStore>, None),
        BackendKind::Sqlite => {
            let store = SqliteBlobStore::open(&config.db_path, config.layout)
                .await
                .with_context(|| format!("opening {}", config.db_path.display()))?;
            let store = Arc::new(store);
            (store.clone() as Arc<dyn BlobStore>, Some(store))
        }
    };
    debug!(backend = ?config.backend, "opened local store");

    match &config.remote {
        Some(remote) => {
            let origin = HttpOrigin::with_config(remote.clone())?;
            let layered = Arc::new(LayeredStore::new(local, origin));
            Ok(Opened {
                store: layered.clone(),
                sqlite,
                layered: Some(layered),
            })
        }
        None => Ok(Opened {
            store: local,
            sqlite,
            layered: None,
        }),
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Put(args) => cmd_put(&config, format, args).await,
        Command::Get(args) => cmd_get(&config, format, args).await,
        Command::Stat(args) => cmd_stat(&config, format, args).await,
        Command::Fetch(args) => cmd_fetch(&config, format, args).await,
        Command::Config(_) => cmd_config(&config, format),
    }
}

async fn read_input(args: &PutArgs) -> anyhow::Result<Vec<u8>> {
    match &args.file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await.context("reading stdin")?;
            Ok(buf)
        }
    }
}

async fn cmd_put(config: &CliConfig, format: OutputFormat, args: PutArgs) -> anyhow::Result<()> {
    let bytes = read_input(&args).await?;
    let opened = open_store(config).await?;
    let size = opened.store.write(&args.hash, args.offset, &bytes).await?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "hash": args.hash,
                "offset": args.offset,
                "written": bytes.len(),
                "size": size,
            })
        ),
        OutputFormat::Text => println!(
            "{} Wrote {} bytes to {} at offset {} (size {})",
            "✓".green().bold(),
            bytes.len(),
            args.hash.as_str().yellow(),
            args.offset,
            size.to_string().bold()
        ),
    }
    Ok(())
}

async fn cmd_get(config: &CliConfig, format: OutputFormat, args: GetArgs) -> anyhow::Result<()> {
    let opened = open_store(config).await?;
    let count = args.count.unwrap_or(u64::MAX);
    let Some(data) = opened.store.read(&args.hash, args.offset, count).await? else {
        bail!("blob {} not found", args.hash);
    };

    if let Some(path) = &args.output {
        tokio::fs::write(path, &data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        match format {
            OutputFormat::Json => println!(
                "{}",
                json!({ "hash": args.hash, "offset": args.offset, "len": data.len(), "output": path })
            ),
            OutputFormat::Text => println!(
                "{} Read {} bytes from {} into {}",
                "✓".green().bold(),
                data.len(),
                args.hash.as_str().yellow(),
                path.display()
            ),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "hash": args.hash,
                "offset": args.offset,
                "len": data.len(),
                "hex": hex::encode(&data),
            })
        ),
        OutputFormat::Text if args.hex => println!("{}", hex::encode(&data)),
        OutputFormat::Text => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn cmd_stat(config: &CliConfig, format: OutputFormat, args: StatArgs) -> anyhow::Result<()> {
    let opened = open_store(config).await?;
    let Some(size) = opened.store.size(&args.hash).await? else {
        bail!("blob {} not found locally", args.hash);
    };
    let record = match &opened.sqlite {
        Some(sqlite) => sqlite.inspect(&args.hash).await?,
        None => None,
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "hash": args.hash,
                "size": size,
                "record": record,
                "layout": config.layout,
            })
        ),
        OutputFormat::Text => {
            println!("Blob {}", args.hash.as_str().yellow().bold());
            println!("  Size: {}", size.to_string().bold());
            if let Some(record) = record {
                println!("  Base record: {} bytes", record.base_len);
                println!(
                    "  Block records: {} x {} bytes",
                    record.extra_block_count,
                    config.layout.block_size()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_fetch(config: &CliConfig, format: OutputFormat, args: FetchArgs) -> anyhow::Result<()> {
    let opened = open_store(config).await?;
    let Some(layered) = &opened.layered else {
        bail!("no remote origin configured (use --remote or a [remote] config section)");
    };
    let size = layered.prefetch(&args.hash).await?;
    let fetched = layered.fetch_count() > 0;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "hash": args.hash, "size": size, "fetched": fetched })
        ),
        OutputFormat::Text if fetched => println!(
            "{} Fetched {} from {} ({} bytes)",
            "✓".green().bold(),
            args.hash.as_str().yellow(),
            layered.origin().base_url().blue(),
            size
        ),
        OutputFormat::Text => println!(
            "{} {} already present ({} bytes)",
            "✓".green(),
            args.hash.as_str().yellow(),
            size
        ),
    }
    Ok(())
}

fn cmd_config(config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
