use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use cndy_cache::{FileCacheStore, DEFAULT_CACHE_DIR};
use cndy_ledger::{CandyMachineRegistry, RpcLedgerClient, TransactionSubmitter};
use cndy_storage::{StorageBackend, StorageConfig, StorageOptions};
use cndy_sync::{discover, read_key_list, sweep, CreateOptions, Deployment, PassReport, Reconciler};
use cndy_types::{parse_go_live_date, Cluster};
use colored::Colorize;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::read_keypair_file;

use crate::cli::*;
use crate::config::Settings;

pub async fn run_command(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    let ctx = Context {
        env: cli.env,
        cache_name: cli.cache_name,
        cache_dir: cli.cache_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
        keypair: cli.keypair,
        rpc_url: cli.env.rpc_url(cli.rpc_url.as_deref().or(settings.ledger.rpc_url.as_deref())),
        settings,
    };
    match cli.command {
        Command::Upload(args) => cmd_upload(&ctx, args).await,
        Command::Create(args) => cmd_create(&ctx, args).await,
        Command::Verify => cmd_verify(&ctx).await,
        Command::Update(args) => cmd_update(&ctx, args).await,
        Command::MintOne => cmd_mint_one(&ctx).await,
        Command::Withdraw(args) => cmd_withdraw(&ctx, args).await,
    }
}

struct Context {
    env: Cluster,
    cache_name: String,
    cache_dir: PathBuf,
    keypair: Option<PathBuf>,
    rpc_url: String,
    settings: Settings,
}

impl Context {
    fn cache_store(&self) -> Arc<FileCacheStore> {
        Arc::new(FileCacheStore::new(&self.cache_dir))
    }

    fn keypair_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.keypair {
            return Ok(path.clone());
        }
        let home = std::env::var("HOME").map_err(|_| anyhow!("--keypair not provided and HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config/solana/id.json"))
    }

    fn submitter(&self) -> anyhow::Result<TransactionSubmitter> {
        let path = self.keypair_path()?;
        let payer = read_keypair_file(&path).map_err(|e| anyhow!("reading keypair {}: {e}", path.display()))?;
        let client = Arc::new(RpcLedgerClient::new(self.rpc_url.clone()));
        Ok(TransactionSubmitter::new(client, Arc::new(payer), self.settings.submit_policy()))
    }

    fn registry(&self) -> anyhow::Result<CandyMachineRegistry> {
        Ok(CandyMachineRegistry::new(self.submitter()?, self.settings.program_id()?))
    }

    fn deployment(&self) -> anyhow::Result<Deployment> {
        Ok(Deployment::new(
            self.cache_store(),
            self.cache_name.clone(),
            self.env,
            Arc::new(self.submitter()?),
            self.settings.program_id()?,
        ))
    }
}

async fn cmd_upload(ctx: &Context, args: UploadArgs) -> anyhow::Result<()> {
    let kind = args.storage.or(ctx.settings.storage.kind).unwrap_or_default();
    let options = storage_options(&ctx.settings.storage.options, &args, |k| std::env::var(k).ok());
    let storage = StorageConfig::resolve(kind, ctx.env.as_str(), &options)?;
    let items = discover(&args.directory, args.number)?;

    let uploader = Arc::new(StorageBackend::from_config(storage, ctx.settings.request_timeout())?);
    let reconciler = Reconciler::new(
        ctx.cache_store(),
        uploader,
        Arc::new(ctx.registry()?),
        ctx.cache_name.clone(),
        ctx.env,
        ctx.settings.sync_settings(!args.no_mutable, !args.no_retain_authority),
    );

    println!(
        "Uploading {} items from {} to {} ({})",
        items.total().to_string().bold(),
        args.directory.display(),
        kind.to_string().cyan(),
        ctx.env.to_string().yellow()
    );
    let report = reconciler
        .run_until_done(&items, args.max_passes, print_pass)
        .await?;

    if report.is_done() {
        println!("{} All {} items registered", "✓".green().bold(), items.total());
        Ok(())
    } else if report.is_stuck() {
        bail!(
            "upload cannot finish: {} of {} items remaining and {} failed permanently; fix them and run upload again",
            report.remaining,
            items.total(),
            report.failed.len()
        )
    } else {
        bail!(
            "stopped after --max-passes: {} of {} items remaining; run upload again",
            report.remaining,
            items.total()
        )
    }
}

fn print_pass(pass: usize, report: &PassReport) {
    println!(
        "Pass {}: {} uploaded, {} registered, {} remaining",
        pass,
        report.uploaded.to_string().green(),
        report.registered.to_string().green(),
        report.remaining.to_string().yellow()
    );
    for failed in &report.failed {
        println!("  {} item {}: {}", "✗".red(), failed.index, failed.reason);
    }
}

/// Storage options from the settings file, overridden by flags, with AWS
/// credentials falling back to the standard environment variables.
fn storage_options(base: &StorageOptions, args: &UploadArgs, env: impl Fn(&str) -> Option<String>) -> StorageOptions {
    let mut opts = base.clone();
    if let Some(v) = &args.ipfs_infura_project_id {
        opts.ipfs_project_id = Some(v.clone());
    }
    if let Some(v) = &args.ipfs_infura_secret {
        opts.ipfs_secret = Some(v.clone());
    }
    if let Some(v) = &args.aws_s3_bucket {
        opts.aws_bucket = Some(v.clone());
    }
    opts.aws_region = opts.aws_region.or_else(|| env("AWS_REGION"));
    opts.aws_access_key_id = opts.aws_access_key_id.or_else(|| env("AWS_ACCESS_KEY_ID"));
    opts.aws_secret_access_key = opts.aws_secret_access_key.or_else(|| env("AWS_SECRET_ACCESS_KEY"));
    opts.aws_session_token = opts.aws_session_token.or_else(|| env("AWS_SESSION_TOKEN"));
    opts
}

async fn cmd_create(ctx: &Context, args: CreateArgs) -> anyhow::Result<()> {
    let opts = CreateOptions {
        price: args.price,
        spl_token: args.spl_token,
        spl_token_account: args.spl_token_account,
        sol_treasury: args.sol_treasury_account,
        go_live_date: args.date.as_deref().map(parse_go_live_date).transpose()?,
    };
    opts.validate()?;
    let created = ctx.deployment()?.create_candy_machine(&opts).await?;
    println!(
        "{} Candy machine created: {}",
        "✓".green().bold(),
        created.address.to_string().cyan()
    );
    println!("  Treasury: {}", created.wallet);
    println!("  Price: {} base units", created.price);
    println!("  Items: {}", created.items_available);
    println!("  Signature: {}", created.signature.to_string().dimmed());
    Ok(())
}

async fn cmd_verify(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.cache_store();
    let registry = ctx.registry()?;
    let report = cndy_sync::verify(store.as_ref(), &ctx.cache_name, ctx.env, &registry).await?;
    if report.reset.is_empty() {
        println!("{} {} items verified", "✓".green().bold(), report.verified);
        return Ok(());
    }
    for index in &report.reset {
        println!("  {} item {} does not match its config line", "✗".red(), index);
    }
    bail!(
        "{} of {} items need to be registered again; run upload",
        report.reset.len(),
        report.reset.len() + report.verified
    )
}

async fn cmd_update(ctx: &Context, args: UpdateArgs) -> anyhow::Result<()> {
    let date = args.date.as_deref().map(parse_go_live_date).transpose()?;
    let sig = ctx
        .deployment()?
        .update_candy_machine(args.price.as_deref(), date)
        .await?;
    println!("{} Candy machine updated ({})", "✓".green().bold(), sig.to_string().dimmed());
    Ok(())
}

async fn cmd_mint_one(ctx: &Context) -> anyhow::Result<()> {
    let mint = ctx.deployment()?.mint_one().await?;
    println!("{} Minted {}", "✓".green().bold(), mint.to_string().cyan());
    Ok(())
}

async fn cmd_withdraw(ctx: &Context, args: WithdrawArgs) -> anyhow::Result<()> {
    let Some(keys) = &args.keys else {
        if args.charity.is_some() || args.charity_percent.is_some() || args.min_balance.is_some() {
            bail!("--charity, --charity-percent and --min-balance only apply to sweeps (--keys)");
        }
        let report = ctx.deployment()?.withdraw(args.dry).await?;
        match report.signature {
            Some(sig) => println!(
                "{} Withdrew {} SOL from {} ({})",
                "✓".green().bold(),
                sol(report.lamports),
                report.candy_machine,
                sig.to_string().dimmed()
            ),
            None => println!("{} SOL available in {}", sol(report.lamports), report.candy_machine),
        }
        return Ok(());
    };

    let settings = ctx.settings.sweep_settings(
        args.min_balance.as_deref(),
        args.charity,
        args.charity_percent,
        args.dry,
    )?;
    settings.validate()?;
    let listed = read_key_list(keys)?;
    let submitter = ctx.submitter()?;
    let report = sweep(&submitter, &listed, &settings).await?;

    for swept in &report.swept {
        match swept.signature {
            Some(_) => println!(
                "  {} {}: withdrew {} SOL{}",
                "✓".green(),
                swept.config,
                sol(swept.withdrawn),
                if swept.split > 0 {
                    format!(", forwarded {} SOL", sol(swept.split))
                } else {
                    String::new()
                }
            ),
            None => println!("  {}: {} SOL listed", swept.config, sol(swept.listed_lamports)),
        }
    }
    for (config, reason) in &report.failed {
        println!("  {} {}: {}", "✗".red(), config, reason);
    }
    println!(
        "Sweep: {} withdrawn, {} below threshold, {} failed",
        report.swept.len().to_string().green(),
        report.skipped,
        report.failed.len().to_string().red()
    );
    Ok(())
}

fn sol(lamports: u64) -> String {
    format!("{}.{:09}", lamports / LAMPORTS_PER_SOL, lamports % LAMPORTS_PER_SOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn upload_args(extra: &[&str]) -> UploadArgs {
        let mut argv = vec!["cndy", "upload", "dir"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Upload(args) => args,
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn flags_override_file_storage_options() {
        let base = StorageOptions {
            ipfs_project_id: Some("from-file".into()),
            aws_bucket: Some("file-bucket".into()),
            ..Default::default()
        };
        let args = upload_args(&["--ipfs-infura-project-id", "from-flag", "--ipfs-infura-secret", "s"]);
        let opts = storage_options(&base, &args, |_| None);
        assert_eq!(opts.ipfs_project_id.as_deref(), Some("from-flag"));
        assert_eq!(opts.ipfs_secret.as_deref(), Some("s"));
        assert_eq!(opts.aws_bucket.as_deref(), Some("file-bucket"));
    }

    #[test]
    fn aws_credentials_fall_back_to_environment() {
        let base = StorageOptions {
            aws_access_key_id: Some("file-key".into()),
            ..Default::default()
        };
        let args = upload_args(&["--aws-s3-bucket", "b"]);
        let opts = storage_options(&base, &args, |k| Some(format!("env-{k}")));
        assert_eq!(opts.aws_access_key_id.as_deref(), Some("file-key"));
        assert_eq!(opts.aws_secret_access_key.as_deref(), Some("env-AWS_SECRET_ACCESS_KEY"));
        assert_eq!(opts.aws_bucket.as_deref(), Some("b"));
    }

    #[test]
    fn sol_formatting() {
        assert_eq!(sol(0), "0.000000000");
        assert_eq!(sol(1_500_000_000), "1.500000000");
        assert_eq!(sol(12), "0.000000012");
    }
}
