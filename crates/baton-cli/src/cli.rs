use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use baton_types::{ListOptions, MetadataOp, OperationOptions};

#[derive(Parser)]
#[command(
    name = "baton",
    about = "baton: JSON in, JSON out client for a data-management server",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "BATON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Read JSON targets from this file instead of stdin
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Flush output after each result
    #[arg(long, global = true)]
    pub unbuffered: bool,

    /// Catalog state file, overriding the configured one
    #[arg(long, global = true, env = "BATON_SANDBOX")]
    pub sandbox: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add or remove AVUs on each target
    Metamod(MetamodArgs),
    /// Replace AVUs on each target, attribute by attribute
    Metasuper(MetasuperArgs),
    /// Upload local files to data objects
    Put(PutArgs),
    /// Download data objects
    Get(GetArgs),
    /// Change access control on each target
    Chmod(ChmodArgs),
    /// Search for paths by AVU
    Metaquery(MetaqueryArgs),
    /// Run a registered SQL query
    Specificquery(SpecificqueryArgs),
    /// Describe each target
    List(ListArgs),
    /// Create collections
    Mkcoll(MkcollArgs),
    /// Remove data objects and collections
    Rm(RmArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OperationArg {
    Add,
    Rm,
}

impl From<OperationArg> for MetadataOp {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Add => MetadataOp::Add,
            OperationArg::Rm => MetadataOp::Remove,
        }
    }
}

#[derive(Args)]
pub struct MetamodArgs {
    /// Operation applied to the target's `avus`. Targets carrying an
    /// `operations` array supply their own.
    #[arg(short, long)]
    pub operation: Option<OperationArg>,
    /// Apply each target's `operations` in a single all-or-nothing request
    #[arg(long)]
    pub atomic: bool,
}

#[derive(Args)]
pub struct MetasuperArgs {}

#[derive(Args)]
pub struct PutArgs {
    /// Ask the server to register a checksum
    #[arg(short, long)]
    pub checksum: bool,
    /// Hold a write lock during the transfer
    #[arg(long)]
    pub wlock: bool,
    /// Stream through a buffer instead of a single put request
    #[arg(long)]
    pub buffered: bool,
    /// Buffer size in bytes for streamed transfers
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Fail the transfer when checksums disagree
    #[arg(long)]
    pub strict_checksum: bool,
}

impl PutArgs {
    pub fn operation_options(&self) -> OperationOptions {
        let mut options = OperationOptions::new();
        if self.checksum {
            options = options.with_checksum();
        }
        if self.wlock {
            options = options.with_write_lock();
        }
        options
    }
}

#[derive(Args)]
pub struct GetArgs {
    /// Write content to stdout without a JSON wrapper
    #[arg(long, conflicts_with = "save")]
    pub raw: bool,
    /// Save content to each target's `directory`/`file`
    #[arg(long)]
    pub save: bool,
    /// Buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Fail the transfer when checksums disagree
    #[arg(long)]
    pub strict_checksum: bool,
}

#[derive(Args)]
pub struct ChmodArgs {
    /// Apply below collections
    #[arg(short, long)]
    pub recurse: bool,
}

#[derive(Args)]
pub struct DecorationArgs {
    /// Include AVUs
    #[arg(long)]
    pub avu: bool,
    /// Include access control lists
    #[arg(long)]
    pub acl: bool,
    /// Include checksums
    #[arg(long)]
    pub checksum: bool,
    /// Include sizes
    #[arg(long)]
    pub size: bool,
}

#[derive(Args)]
pub struct MetaqueryArgs {
    #[command(flatten)]
    pub decoration: DecorationArgs,
    /// Zone to search
    #[arg(short, long)]
    pub zone: Option<String>,
}

#[derive(Args)]
pub struct SpecificqueryArgs {
    /// Zone to query
    #[arg(short, long)]
    pub zone: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub decoration: DecorationArgs,
    /// List the immediate contents of collections
    #[arg(long)]
    pub contents: bool,
}

impl DecorationArgs {
    pub fn list_options(&self, contents: bool) -> ListOptions {
        ListOptions {
            avu: self.avu,
            acl: self.acl,
            checksum: self.checksum,
            size: self.size,
            contents,
        }
    }
}

#[derive(Args)]
pub struct MkcollArgs {
    /// Create missing parent collections
    #[arg(short, long)]
    pub recurse: bool,
}

#[derive(Args)]
pub struct RmArgs {
    /// Remove collections and everything below them
    #[arg(short, long)]
    pub recurse: bool,
    /// Remove without moving to trash
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_metamod() {
        let cli = Cli::try_parse_from(["baton", "metamod", "--operation", "rm"]).unwrap();
        let Command::Metamod(args) = cli.command else {
            panic!("expected metamod");
        };
        assert_eq!(args.operation, Some(OperationArg::Rm));
        assert_eq!(MetadataOp::from(args.operation.unwrap()), MetadataOp::Remove);
        assert!(!args.atomic);
    }

    #[test]
    fn parse_put_options() {
        let cli = Cli::try_parse_from([
            "baton", "put", "--checksum", "--wlock", "--buffered", "--buffer-size", "1024",
        ])
        .unwrap();
        let Command::Put(args) = cli.command else {
            panic!("expected put");
        };
        let options = args.operation_options();
        assert!(options.checksum_on_write);
        assert!(options.write_lock);
        assert!(args.buffered);
        assert_eq!(args.buffer_size, Some(1024));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "baton", "list", "--avu", "--contents", "-v", "--sandbox", "state.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.sandbox, Some(PathBuf::from("state.json")));
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        let options = args.decoration.list_options(args.contents);
        assert!(options.avu && options.contents);
        assert!(!options.acl);
    }

    #[test]
    fn raw_conflicts_with_save() {
        assert!(Cli::try_parse_from(["baton", "get", "--raw", "--save"]).is_err());
    }

    #[test]
    fn unknown_operation_rejected() {
        assert!(Cli::try_parse_from(["baton", "metamod", "--operation", "set"]).is_err());
    }
}
