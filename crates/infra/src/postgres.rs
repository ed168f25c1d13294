//! Postgres-backed membership store.
//!
//! Implements every store trait of `cashbook-membership` over one connection
//! pool. The `(workspace_id, user_id)` uniqueness of memberships is enforced
//! by a unique constraint, so concurrent inserts cannot both succeed.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use cashbook_auth::{Role, TokenHash};
use cashbook_core::{DomainError, EmailAddress, InvitationId, MembershipId, UserId, WorkspaceId};
use cashbook_membership::{
    Invitation, InvitationStore, Membership, MembershipStore, NewInvitation, NewMembership, Page,
    PageRequest, PreferenceStore, StoreError, Workspace, WorkspaceStore,
};

/// Schema for the membership tables. Idempotent.
pub const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    currency    CHAR(3) NOT NULL,
    owner_id    TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS workspace_memberships (
    id            TEXT PRIMARY KEY,
    workspace_id  TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    role          TEXT NOT NULL CHECK (role IN ('viewer', 'editor', 'admin', 'owner')),
    created_at    TIMESTAMPTZ NOT NULL,
    CONSTRAINT workspace_memberships_workspace_user_key UNIQUE (workspace_id, user_id)
);

CREATE INDEX IF NOT EXISTS workspace_memberships_user_idx
    ON workspace_memberships (user_id);

CREATE TABLE IF NOT EXISTS workspace_invitations (
    id            TEXT PRIMARY KEY,
    workspace_id  TEXT NOT NULL,
    email         TEXT NOT NULL,
    role          TEXT NOT NULL CHECK (role IN ('viewer', 'editor', 'admin', 'owner')),
    token_hash    TEXT NOT NULL,
    invited_by    TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    expires_at    TIMESTAMPTZ NOT NULL,
    accepted_at   TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS workspace_invitations_token_hash_idx
    ON workspace_invitations (token_hash);

CREATE INDEX IF NOT EXISTS workspace_invitations_workspace_email_idx
    ON workspace_invitations (workspace_id, email);

CREATE TABLE IF NOT EXISTS user_preferences (
    user_id                 TEXT PRIMARY KEY,
    preferred_workspace_id  TEXT NOT NULL,
    updated_at              TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

const MEMBERSHIP_COLUMNS: &str = "id, workspace_id, user_id, role, created_at";

const INVITATION_COLUMNS: &str =
    "id, workspace_id, email, role, token_hash, invited_by, created_at, expires_at, accepted_at";

/// The statements of [`MIGRATION`], in order.
fn migration_statements() -> impl Iterator<Item = &'static str> {
    MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply [`MIGRATION`] in a single transaction.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        for statement in migration_statements() {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        debug!("membership schema migrated");
        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for PostgresStore {
    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, currency, owner_id, created_at FROM workspaces WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_workspace", e))?;

        row.map(|r| workspace_from_row(&r)).transpose()
    }

    async fn insert_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workspaces (id, name, currency, owner_id, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(workspace.id.as_str())
        .bind(&workspace.name)
        .bind(&workspace.currency)
        .bind(workspace.owner_id.as_str())
        .bind(workspace.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_workspace", e))?;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for PostgresStore {
    #[instrument(skip_all, fields(workspace_id = %workspace_id, user_id = %user_id), err)]
    async fn find_memberships(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM workspace_memberships \
             WHERE workspace_id = $1 AND user_id = $2"
        ))
        .bind(workspace_id.as_str())
        .bind(user_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_memberships", e))?;

        rows.iter().map(membership_from_row).collect()
    }

    async fn first_membership_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM workspace_memberships \
             WHERE user_id = $1 ORDER BY created_at, id LIMIT 1"
        ))
        .bind(user_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("first_membership_for_user", e))?;

        row.as_ref().map(membership_from_row).transpose()
    }

    async fn list_workspace_members(
        &self,
        workspace_id: &WorkspaceId,
        page: &PageRequest,
    ) -> Result<Page<Membership>, StoreError> {
        // One extra row tells whether another page follows.
        let fetch = i64::from(page.limit) + 1;
        let rows = sqlx::query(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM workspace_memberships \
             WHERE workspace_id = $1 AND ($2::TEXT IS NULL OR id > $2) \
             ORDER BY id LIMIT $3"
        ))
        .bind(workspace_id.as_str())
        .bind(page.cursor.as_deref())
        .bind(fetch)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_workspace_members", e))?;

        let mut items = rows
            .iter()
            .map(membership_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = items.len() > page.limit as usize;
        items.truncate(page.limit as usize);
        let next_cursor = if has_more {
            items.last().map(|m| m.id.to_string())
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    #[instrument(skip(self, new), fields(workspace_id = %new.workspace_id, user_id = %new.user_id), err)]
    async fn create_membership(&self, new: NewMembership) -> Result<Membership, StoreError> {
        let id = MembershipId::generate();
        sqlx::query(
            "INSERT INTO workspace_memberships (id, workspace_id, user_id, role, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id.as_str())
        .bind(new.workspace_id.as_str())
        .bind(new.user_id.as_str())
        .bind(new.role.as_str())
        .bind(new.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_membership", e))?;

        Ok(Membership {
            id,
            workspace_id: new.workspace_id,
            user_id: new.user_id,
            role: new.role,
            created_at: new.created_at,
        })
    }

    async fn update_membership_role(
        &self,
        id: &MembershipId,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE workspace_memberships SET role = $2 WHERE id = $1 \
             RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(id.as_str())
        .bind(role.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_membership_role", e))?
        .ok_or_else(|| StoreError::NotFound(format!("membership {id}")))?;

        membership_from_row(&row)
    }

    async fn delete_membership(&self, id: &MembershipId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM workspace_memberships WHERE id = $1")
            .bind(id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_membership", e))?;
        Ok(())
    }
}

#[async_trait]
impl InvitationStore for PostgresStore {
    async fn get_invitation(&self, id: &InvitationId) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM workspace_invitations WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_invitation", e))?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_unaccepted_by_hash(
        &self,
        token_hash: &TokenHash,
    ) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM workspace_invitations \
             WHERE token_hash = $1 AND accepted_at IS NULL LIMIT 1"
        ))
        .bind(token_hash.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_unaccepted_by_hash", e))?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_unaccepted_for_email(
        &self,
        workspace_id: &WorkspaceId,
        email: &EmailAddress,
    ) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM workspace_invitations \
             WHERE workspace_id = $1 AND email = $2 AND accepted_at IS NULL"
        ))
        .bind(workspace_id.as_str())
        .bind(email.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_unaccepted_for_email", e))?;

        rows.iter().map(invitation_from_row).collect()
    }

    async fn list_unaccepted(&self, workspace_id: &WorkspaceId) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM workspace_invitations \
             WHERE workspace_id = $1 AND accepted_at IS NULL ORDER BY created_at"
        ))
        .bind(workspace_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_unaccepted", e))?;

        rows.iter().map(invitation_from_row).collect()
    }

    #[instrument(skip(self, new), fields(workspace_id = %new.workspace_id), err)]
    async fn create_invitation(&self, new: NewInvitation) -> Result<Invitation, StoreError> {
        let id = InvitationId::generate();
        sqlx::query(
            "INSERT INTO workspace_invitations \
             (id, workspace_id, email, role, token_hash, invited_by, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id.as_str())
        .bind(new.workspace_id.as_str())
        .bind(new.email.as_str())
        .bind(new.role.as_str())
        .bind(new.token_hash.as_str())
        .bind(new.invited_by.as_str())
        .bind(new.created_at)
        .bind(new.expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_invitation", e))?;

        Ok(Invitation {
            id,
            workspace_id: new.workspace_id,
            email: new.email,
            role: new.role,
            token_hash: new.token_hash,
            invited_by: new.invited_by,
            created_at: new.created_at,
            expires_at: new.expires_at,
            accepted_at: None,
        })
    }

    async fn mark_accepted(&self, id: &InvitationId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE workspace_invitations SET accepted_at = COALESCE(accepted_at, $2) WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_accepted", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("invitation {id}")));
        }
        Ok(())
    }

    async fn delete_invitation(&self, id: &InvitationId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM workspace_invitations WHERE id = $1")
            .bind(id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_invitation", e))?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PostgresStore {
    async fn preferred_workspace(&self, user_id: &UserId) -> Result<Option<WorkspaceId>, StoreError> {
        let row = sqlx::query("SELECT preferred_workspace_id FROM user_preferences WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("preferred_workspace", e))?;

        row.map(|r| {
            r.try_get::<String, _>("preferred_workspace_id")
                .map_err(|e| map_sqlx_error("preferred_workspace", e))
                .and_then(decode_id::<WorkspaceId>)
        })
        .transpose()
    }

    async fn set_preferred_workspace(
        &self,
        user_id: &UserId,
        workspace_id: &WorkspaceId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, preferred_workspace_id, updated_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET preferred_workspace_id = EXCLUDED.preferred_workspace_id, updated_at = now()",
        )
        .bind(user_id.as_str())
        .bind(workspace_id.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_preferred_workspace", e))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn decode_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Backend(format!("invalid stored role: {e}")))
}

fn decode_id<T>(raw: String) -> Result<T, StoreError>
where
    T: TryFrom<String, Error = DomainError>,
{
    T::try_from(raw).map_err(|e| StoreError::Backend(format!("invalid stored id: {e}")))
}

fn decode_email(raw: String) -> Result<EmailAddress, StoreError> {
    EmailAddress::try_from(raw).map_err(|e| StoreError::Backend(format!("invalid stored email: {e}")))
}

fn workspace_from_row(row: &PgRow) -> Result<Workspace, StoreError> {
    let decode = |e| map_sqlx_error("decode workspace", e);
    Ok(Workspace {
        id: decode_id(row.try_get("id").map_err(decode)?)?,
        name: row.try_get("name").map_err(decode)?,
        currency: row.try_get("currency").map_err(decode)?,
        owner_id: decode_id(row.try_get("owner_id").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    let decode = |e| map_sqlx_error("decode membership", e);
    Ok(Membership {
        id: decode_id(row.try_get("id").map_err(decode)?)?,
        workspace_id: decode_id(row.try_get("workspace_id").map_err(decode)?)?,
        user_id: decode_id(row.try_get("user_id").map_err(decode)?)?,
        role: decode_role(&row.try_get::<String, _>("role").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn invitation_from_row(row: &PgRow) -> Result<Invitation, StoreError> {
    let decode = |e| map_sqlx_error("decode invitation", e);
    Ok(Invitation {
        id: decode_id(row.try_get("id").map_err(decode)?)?,
        workspace_id: decode_id(row.try_get("workspace_id").map_err(decode)?)?,
        email: decode_email(row.try_get("email").map_err(decode)?)?,
        role: decode_role(&row.try_get::<String, _>("role").map_err(decode)?)?,
        token_hash: TokenHash::from_stored(row.try_get::<String, _>("token_hash").map_err(decode)?),
        invited_by: decode_id(row.try_get("invited_by").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        expires_at: row.try_get("expires_at").map_err(decode)?,
        accepted_at: row.try_get("accepted_at").map_err(decode)?,
    })
}

/// Map SQLx errors to store errors.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code() {
                // Unique violation
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
