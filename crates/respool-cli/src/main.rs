use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use respool_core::{ResourceDescriptor, ResourceDigest};
use respool_storage::{IngestSummary, PoolConfig, ResourcePool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "respool", version, about = "Content-addressed resource pool")]
struct Cli {
    /// Pool location (s3://KEY:SECRET@bucket.server/prefix, file:///path, or a path)
    #[arg(long, env = "RESPOOL_LOCATION")]
    location: Option<String>,
    /// Smallest file size to pool, in bytes
    #[arg(long, env = "RESPOOL_MIN_SIZE")]
    min_size: Option<u64>,
    /// Largest file size to pool, in bytes
    #[arg(long, env = "RESPOOL_MAX_SIZE")]
    max_size: Option<u64>,
    /// Local marker directory for S3 pools
    #[arg(long, env = "RESPOOL_MARKER_DIR")]
    marker_dir: Option<String>,
    /// Print results as JSON
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the storage key derived from a digest
    Key { digest: ResourceDigest },
    /// Check whether the pool holds a digest at the given size
    Known { digest: ResourceDigest, size: u64 },
    /// Store files (directories are walked recursively)
    Ingest(IngestArgs),
    /// Report stored sizes for <digest>:<size> descriptors the pool holds
    Verify(DescriptorArgs),
    /// Report which <digest>:<size> descriptors the pool already knows
    Match(DescriptorArgs),
    /// Write stored content to a local path
    Materialize(MaterializeArgs),
}

#[derive(Args)]
struct IngestArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct DescriptorArgs {
    #[arg(required = true, value_name = "DIGEST:SIZE")]
    descriptors: Vec<ResourceDescriptor>,
}

#[derive(Args)]
struct MaterializeArgs {
    digest: ResourceDigest,
    size: u64,
    destination: PathBuf,
    /// Skip the size check against the pool before writing
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,respool=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing::debug!("Pool configuration: {:?}", config.backend);
    let pool = config.build().await.context("failed to open resource pool")?;

    run(pool, cli.command, cli.json).await
}

/// Resolve the pool config from the parsed flags
///
/// Clap has already folded the `RESPOOL_*` variables into `cli`, so the
/// storage crate's lookup sees flags and environment as one source.
fn load_config(cli: &Cli) -> Result<PoolConfig> {
    PoolConfig::from_lookup(|name| match name {
        "RESPOOL_LOCATION" => cli.location.clone(),
        "RESPOOL_MIN_SIZE" => cli.min_size.map(|size| size.to_string()),
        "RESPOOL_MAX_SIZE" => cli.max_size.map(|size| size.to_string()),
        "RESPOOL_MARKER_DIR" => cli.marker_dir.clone(),
        _ => None,
    })
    .context("invalid pool configuration")
}

async fn run(pool: Arc<dyn ResourcePool>, command: Command, json: bool) -> Result<ExitCode> {
    match command {
        Command::Key { digest } => {
            let key = pool.options().layout.relative_path(&digest);
            println!("{}", key.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Known { digest, size } => {
            let known = pool.known(&ResourceDescriptor::new(digest, size)).await?;
            println!("{}", known);
            Ok(if known {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Ingest(args) => {
            let mut total = IngestSummary::default();
            for path in &args.paths {
                let metadata = tokio::fs::symlink_metadata(path)
                    .await
                    .with_context(|| format!("cannot stat {}", path.display()))?;
                if metadata.is_dir() {
                    let summary = pool
                        .ingest_directory(path)
                        .await
                        .with_context(|| format!("failed to ingest {}", path.display()))?;
                    total.stored += summary.stored;
                    total.skipped += summary.skipped;
                } else if pool
                    .ingest(path)
                    .await
                    .with_context(|| format!("failed to ingest {}", path.display()))?
                {
                    total.stored += 1;
                } else {
                    total.skipped += 1;
                }
            }

            if json {
                println!(
                    "{}",
                    serde_json::json!({ "stored": total.stored, "skipped": total.skipped })
                );
            } else {
                println!("stored {} skipped {}", total.stored, total.skipped);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify(args) => {
            let verified = pool.verify_sizes(&args.descriptors).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&verified)?);
            } else {
                for entry in &verified {
                    println!("{} {}", entry.descriptor, entry.observed_size);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Match(args) => {
            let matched = pool.match_resources(&args.descriptors).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&matched)?);
            } else {
                for descriptor in &matched {
                    println!("{}", descriptor);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Materialize(args) => {
            let descriptor = ResourceDescriptor::new(args.digest, args.size);
            if args.force {
                pool.materialize(&descriptor, &args.destination).await?;
            } else {
                pool.copy(&descriptor, &args.destination).await?;
            }
            tracing::info!(
                "Materialized {} to {}",
                descriptor,
                args.destination.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respool_storage::BackendConfig;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_load_config_from_flags() {
        let cli = parse(&[
            "respool",
            "--location",
            "s3://bucket.minio.local/res",
            "--min-size",
            "16",
            "--max-size",
            "4096",
            "--marker-dir",
            "/var/cache/respool",
            "key",
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.minimum_size, 16);
        assert_eq!(config.maximum_size, 4096);
        match config.backend {
            BackendConfig::S3 {
                bucket, marker_dir, ..
            } => {
                assert_eq!(bucket, "bucket");
                assert_eq!(marker_dir.as_deref(), Some("/var/cache/respool"));
            }
            other => panic!("Expected S3 backend, got {other:?}"),
        }
    }

    #[test]
    fn test_load_config_local_path() {
        let cli = parse(&[
            "respool",
            "--location",
            "/srv/resources",
            "match",
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed:11",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config, PoolConfig::local("/srv/resources"));
    }
}
