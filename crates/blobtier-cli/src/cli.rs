use std::path::PathBuf;

use blobtier_types::ContentHash;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobtier",
    about = "Chunked content-addressed blob store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (selects the sqlite backend)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Remote origin base URL; blobs are fetched from `{URL}/{hash}`
    #[arg(long, global = true)]
    pub remote: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a file (or stdin) into a blob
    Put(PutArgs),
    /// Read a byte range of a blob
    Get(GetArgs),
    /// Show a blob's size and record layout
    Stat(StatArgs),
    /// Pull a blob from the remote origin into the local store
    Fetch(FetchArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub hash: ContentHash,
    /// Input file; stdin when omitted
    pub file: Option<PathBuf>,
    #[arg(long, default_value = "0")]
    pub offset: u64,
}

#[derive(Args)]
pub struct GetArgs {
    pub hash: ContentHash,
    #[arg(long, default_value = "0")]
    pub offset: u64,
    /// Bytes to read; the rest of the blob when omitted
    #[arg(long)]
    pub count: Option<u64>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print the bytes hex-encoded
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args)]
pub struct StatArgs {
    pub hash: ContentHash,
}

#[derive(Args)]
pub struct FetchArgs {
    pub hash: ContentHash,
}

#[derive(Args)]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_put_from_stdin() {
        let cli = Cli::try_parse_from(["blobtier", "put", "abc123"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.hash.as_str(), "abc123");
            assert!(args.file.is_none());
            assert_eq!(args.offset, 0);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_with_offset() {
        let cli = Cli::try_parse_from(["blobtier", "put", "abc", "data.bin", "--offset", "4096"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.file, Some(PathBuf::from("data.bin")));
            assert_eq!(args.offset, 4096);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_range() {
        let cli = Cli::try_parse_from([
            "blobtier", "get", "abc", "--offset", "10", "--count", "20", "--hex",
        ])
        .unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.offset, 10);
            assert_eq!(args.count, Some(20));
            assert!(args.hex);
            assert!(args.output.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_output() {
        let cli = Cli::try_parse_from(["blobtier", "get", "abc", "-o", "out.bin"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.output, Some(PathBuf::from("out.bin")));
            assert_eq!(args.count, None);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn rejects_invalid_hash() {
        assert!(Cli::try_parse_from(["blobtier", "stat", "not/a/hash"]).is_err());
    }

    #[test]
    fn parse_stat_and_fetch() {
        let cli = Cli::try_parse_from(["blobtier", "stat", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Stat(_)));
        let cli = Cli::try_parse_from(["blobtier", "fetch", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Fetch(_)));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "blobtier",
            "config",
            "--config",
            "blobtier.toml",
            "--db",
            "/tmp/b.db",
            "--remote",
            "https://origin.example/blobs",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("blobtier.toml")));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/b.db")));
        assert_eq!(cli.remote.as_deref(), Some("https://origin.example/blobs"));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["blobtier", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["blobtier", "--format", "json", "stat", "abc"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
