use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cndy_ledger::Pubkey;
use cndy_storage::StorageKind;
use cndy_types::Cluster;

#[derive(Parser)]
#[command(
    name = "cndy",
    about = "Upload a collection, register it on-chain and manage its candy machine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Cluster: devnet, testnet, mainnet-beta or localnet
    #[arg(short, long, global = true, default_value = "devnet")]
    pub env: Cluster,

    /// Operator wallet keypair file
    #[arg(short, long, global = true)]
    pub keypair: Option<PathBuf>,

    #[arg(short, long, global = true, default_value = "temp")]
    pub cache_name: String,

    /// Directory holding cache files
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    /// Custom RPC endpoint
    #[arg(short, long, global = true)]
    pub rpc_url: Option<String>,

    /// TOML file with tuning settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload items and register them in a config account
    Upload(UploadArgs),
    /// Create the candy machine for a fully uploaded cache
    Create(CreateArgs),
    /// Check every cached item against its on-chain config line
    Verify,
    /// Change the price or go-live date
    Update(UpdateArgs),
    /// Mint one token to the operator wallet
    MintOne,
    /// Withdraw funds, or sweep many deployments with --keys
    Withdraw(WithdrawArgs),
}

#[derive(Args)]
pub struct UploadArgs {
    /// Directory containing <i>.png and <i>.json, numbered from 0
    pub directory: PathBuf,

    /// Config capacity; defaults to the number of items
    #[arg(short, long)]
    pub number: Option<u32>,

    /// arweave, ipfs or aws
    #[arg(short, long)]
    pub storage: Option<StorageKind>,

    #[arg(long)]
    pub ipfs_infura_project_id: Option<String>,

    #[arg(long)]
    pub ipfs_infura_secret: Option<String>,

    /// Existing S3 bucket
    #[arg(long)]
    pub aws_s3_bucket: Option<String>,

    /// Do not retain authority to update metadata
    #[arg(long)]
    pub no_retain_authority: bool,

    /// Metadata will not be editable
    #[arg(long)]
    pub no_mutable: bool,

    /// Stop after this many passes instead of running until every item
    /// is registered
    #[arg(long)]
    pub max_passes: Option<usize>,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Price in SOL, or in the SPL token when --spl-token is set
    #[arg(short, long, default_value = "1")]
    pub price: String,

    /// SPL token mint used to price mints
    #[arg(short = 't', long)]
    pub spl_token: Option<Pubkey>,

    /// SPL token account receiving payments
    #[arg(short = 'a', long)]
    pub spl_token_account: Option<Pubkey>,

    /// SOL account receiving payments
    #[arg(short, long)]
    pub sol_treasury_account: Option<Pubkey>,

    /// "now", RFC 3339 or RFC 2822
    #[arg(short, long)]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[arg(short, long)]
    pub price: Option<String>,

    /// "now", RFC 3339 or RFC 2822
    #[arg(short, long)]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct WithdrawArgs {
    /// Show the amount without withdrawing
    #[arg(short, long)]
    pub dry: bool,

    /// Key list of configs to sweep (getProgramAccounts JSON)
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Recipient of a share of each swept withdrawal
    #[arg(long)]
    pub charity: Option<Pubkey>,

    /// Share sent to --charity, 0 to 100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub charity_percent: Option<u8>,

    /// Skip configs holding at most this many SOL
    #[arg(long)]
    pub min_balance: Option<String>,
}
