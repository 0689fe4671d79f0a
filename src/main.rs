use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use ledgersync::{
    AccountRecord, Action, CategoryKind, CategoryRecord, DirectoryCloudStore, Ledger,
    LedgerConfig, SyncOutcome, TransactionRecord,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(about = "Local-first finance ledger synced through a shared folder")]
struct Cli {
    /// JSON config file; overrides --data-dir when given
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = ".ledgersync")]
    data_dir: PathBuf,

    /// Folder kept in sync by a cloud client
    #[arg(long, global = true, default_value = "cloud")]
    remote_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Income,
    Expense,
}

impl From<KindArg> for CategoryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Income => CategoryKind::Income,
            KindArg::Expense => CategoryKind::Expense,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    AddAccount {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        opening_balance_minor: i64,
    },
    AddCategory {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        parent: Option<String>,
    },
    AddTransaction {
        #[arg(long)]
        id: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        category: Option<String>,
        /// Signed amount in minor units; spending is negative
        #[arg(long, allow_hyphen_values = true)]
        amount_minor: i64,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "")]
        memo: String,
    },
    DeleteTransaction {
        #[arg(long)]
        id: String,
    },
    Sync,
    Status,
    Show,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LedgerConfig::from_json_file(path)
            .await
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => LedgerConfig::new(&cli.data_dir),
    };
    let cloud = Arc::new(DirectoryCloudStore::new(&cli.remote_dir));
    let ledger = Ledger::open(config, cloud)
        .await
        .context("Failed to open ledger")?;

    match cli.command {
        Command::AddAccount {
            id,
            name,
            currency,
            opening_balance_minor,
        } => {
            let action = Action::add_account(&AccountRecord {
                id,
                name,
                currency,
                opening_balance_minor,
            })?;
            dispatch(&ledger, action).await
        }
        Command::AddCategory {
            id,
            name,
            kind,
            parent,
        } => {
            let action = Action::add_category(&CategoryRecord {
                id,
                name,
                kind: kind.into(),
                parent_id: parent,
            })?;
            dispatch(&ledger, action).await
        }
        Command::AddTransaction {
            id,
            account,
            category,
            amount_minor,
            date,
            memo,
        } => {
            let occurred_on = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}'", date))?;
            let action = Action::add_transaction(&TransactionRecord {
                id,
                account_id: account,
                category_id: category,
                amount_minor,
                occurred_on,
                memo,
            })?;
            dispatch(&ledger, action).await
        }
        Command::DeleteTransaction { id } => {
            dispatch(&ledger, Action::delete_transaction(id)?).await
        }
        Command::Sync => sync(&ledger).await,
        Command::Status => status(&ledger).await,
        Command::Show => show(&ledger).await,
    }
}

async fn dispatch(ledger: &Ledger, action: Action) -> Result<()> {
    let kind = action.kind;
    let summary = ledger
        .dispatch(vec![action])
        .await
        .with_context(|| format!("Failed to record {}", kind))?;
    println!(
        "Recorded {} ({} actions projected, {:?})",
        kind, summary.total, summary.mode
    );
    Ok(())
}

async fn sync(ledger: &Ledger) -> Result<()> {
    match ledger.run_sync().await {
        Ok(SyncOutcome::Completed(report)) => {
            println!(
                "Sync #{}: {:?}, pulled {}, pushed {}, {} actions total",
                report.cycle, report.divergence, report.pulled, report.pushed, report.total_actions
            );
            Ok(())
        }
        Ok(SyncOutcome::Queued) => {
            println!("Sync already running; follow-up queued");
            Ok(())
        }
        Err(err) => Err(anyhow!("Sync failed [{}]: {}", err.code(), err)),
    }
}

async fn status(ledger: &Ledger) -> Result<()> {
    let status = ledger.status().await;
    println!("Schema version:   {}", status.schema_version);
    println!("Local actions:    {}", status.local_actions);
    println!("Remote (cached):  {}", status.replica_actions);
    println!("Not yet pushed:   {}", status.unsynced_actions);
    println!("Skipped actions:  {}", status.skipped_actions);
    println!("Sync state:       {}", status.sync_state);
    Ok(())
}

async fn show(ledger: &Ledger) -> Result<()> {
    println!("Accounts:");
    for account in ledger.accounts().await {
        println!(
            "  {:<16} {:>14} {} ({} transactions)",
            account.account.name,
            format_minor(account.balance_minor),
            account.account.currency,
            account.transaction_count
        );
    }

    println!("Categories:");
    for category in ledger.categories().await {
        println!("  {:<16} {:?}", category.name, category.kind);
    }

    println!("Transactions:");
    for tx in ledger.transactions().await {
        println!(
            "  {} {:<10} {:>12} {:<12} {}",
            tx.occurred_on,
            tx.account_id,
            format_minor(tx.amount_minor),
            tx.category_id.as_deref().unwrap_or("-"),
            tx.memo
        );
    }
    Ok(())
}

fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
