//! Moves records still tagged with the legacy `"default"` workspace into a
//! real workspace. Run once per deployment, separately from the service.

mod plan;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use cashbook_auth::Role;
use cashbook_core::WorkspaceId;
use cashbook_infra::PostgresStore;
use cashbook_membership::{MembershipStore, NewMembership, WorkspaceStore};
use cashbook_observability::LogFormat;

use crate::plan::{LEGACY_WORKSPACE_ID, TableName, parse_tables};

#[derive(Parser, Debug)]
#[command(name = "cashbook-backfill")]
#[command(about = "Rewrite legacy 'default' workspace records to a real workspace")]
struct Cli {
    /// Database URL (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Target workspace id
    #[arg(long)]
    workspace: String,

    /// Table to rewrite; repeat for several
    #[arg(long = "table", required = true)]
    tables: Vec<String>,

    /// Count affected rows without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Log output format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cashbook_observability::init_with(cli.log_format);

    let tables = parse_tables(&cli.tables)?;
    let workspace_id = WorkspaceId::new(cli.workspace.as_str())
        .context("--workspace must not be blank")?;
    if workspace_id.as_str() == LEGACY_WORKSPACE_ID {
        bail!("target workspace cannot be '{LEGACY_WORKSPACE_ID}'");
    }

    let store = PostgresStore::connect(&cli.database_url)
        .await
        .context("failed to connect to database")?;

    ensure_owner_membership(&store, &workspace_id, cli.dry_run).await?;
    rewrite_tables(&store, &workspace_id, &tables, cli.dry_run).await?;

    Ok(())
}

/// The workspace must exist and its recorded owner must hold `owner`.
async fn ensure_owner_membership(
    store: &PostgresStore,
    workspace_id: &WorkspaceId,
    dry_run: bool,
) -> anyhow::Result<()> {
    let Some(workspace) = store.get_workspace(workspace_id).await? else {
        bail!("workspace {workspace_id} does not exist");
    };
    let owner = &workspace.owner_id;

    let memberships = store.find_memberships(workspace_id, owner).await?;
    match memberships.as_slice() {
        [] if dry_run => info!(%workspace_id, user_id = %owner, "would create owner membership"),
        [] => {
            store
                .create_membership(NewMembership {
                    workspace_id: workspace_id.clone(),
                    user_id: owner.clone(),
                    role: Role::Owner,
                    created_at: Utc::now(),
                })
                .await?;
            info!(%workspace_id, user_id = %owner, "created owner membership");
        }
        [m] if m.role == Role::Owner => {}
        [m] if dry_run => {
            info!(%workspace_id, user_id = %owner, role = %m.role, "would promote owner to 'owner'")
        }
        [m] => {
            store.update_membership_role(&m.id, Role::Owner).await?;
            warn!(%workspace_id, user_id = %owner, previous = %m.role, "promoted owner to 'owner'");
        }
        many => bail!(
            "{} memberships for owner {owner} in workspace {workspace_id}; fix them before backfilling",
            many.len()
        ),
    }
    Ok(())
}

/// Rewrite every table inside one transaction. A dry run only counts.
async fn rewrite_tables(
    store: &PostgresStore,
    workspace_id: &WorkspaceId,
    tables: &[TableName],
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut tx = store.pool().begin().await?;
    let mut total: u64 = 0;

    for table in tables {
        let affected = if dry_run {
            let count: i64 = sqlx::query_scalar(&table.count_sql())
                .bind(LEGACY_WORKSPACE_ID)
                .fetch_one(&mut *tx)
                .await
                .with_context(|| format!("failed to count rows in {table}"))?;
            u64::try_from(count).unwrap_or(0)
        } else {
            sqlx::query(&table.rewrite_sql())
                .bind(workspace_id.as_str())
                .bind(LEGACY_WORKSPACE_ID)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to rewrite {table}"))?
                .rows_affected()
        };
        info!(table = %table, rows = affected, dry_run, "table processed");
        total += affected;
    }

    if dry_run {
        tx.rollback().await?;
        info!(%workspace_id, rows = total, "dry run complete; nothing written");
    } else {
        tx.commit().await?;
        info!(%workspace_id, rows = total, "backfill committed");
    }
    Ok(())
}
