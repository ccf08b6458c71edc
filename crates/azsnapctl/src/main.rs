use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod arm;
mod auth;
mod ops;

#[derive(Debug, Parser)]
#[command(
    name = "azsnapctl",
    version,
    about = "Managed-disk snapshot tool with prefix-based retention pruning"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Create a snapshot of a managed disk, then prune older snapshots
    /// sharing its name prefix.
    Create(CreateArgs),
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Tenant ID against which to authenticate.
    #[arg(short = 't', long)]
    tenant_id: String,

    /// Subscription ID in which the managed disk exists.
    #[arg(short = 's', long)]
    subscription_id: String,

    /// Subscription ID in which the snapshot will be created.
    #[arg(short = 'i', long)]
    target_subscription_id: String,

    /// Resource group in which the managed disk exists.
    #[arg(short = 'g', long)]
    resource_group: String,

    /// Resource group in which the snapshot will be created.
    #[arg(short = 'o', long)]
    target_resource_group: String,

    /// Name of the managed disk from which to take a snapshot.
    #[arg(short = 'n', long)]
    disk_name: String,

    /// Snapshot name prefix; a timestamp is appended to it.
    #[arg(short = 'f', long)]
    snapshot_name: String,

    /// Number of same-prefix snapshots to retain. 0 keeps everything.
    #[arg(short = 'l', long, default_value_t = 0)]
    retain_limit: usize,

    /// Snapshot storage SKU, e.g. Standard_LRS or Premium_LRS.
    #[arg(short = 'k', long, default_value = "Standard_LRS")]
    sku_type: String,
}

impl CreateArgs {
    /// Normalize user input exactly once, here at the boundary.
    fn into_spec(self) -> ops::CreateSpec {
        ops::CreateSpec {
            tenant_id: self.tenant_id.trim().to_string(),
            subscription_id: self.subscription_id.trim().to_string(),
            target_subscription_id: self.target_subscription_id.trim().to_string(),
            resource_group: self.resource_group.trim().to_string(),
            target_resource_group: self.target_resource_group.trim().to_string(),
            disk_name: self.disk_name.trim().to_string(),
            snapshot_prefix: self.snapshot_name.trim().to_string(),
            retain_limit: self.retain_limit,
            sku: self.sku_type.trim().to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Create(args) => {
            let spec = args.into_spec();
            let chain = auth::CredentialChain::from_env(&spec.tenant_id);
            let token = chain
                .acquire()
                .await
                .context("failed to obtain a management API credential")?;
            let client = arm::ArmClient::new(token);
            ops::run_create(&client, &spec).await?;
        }
    }

    Ok(())
}
