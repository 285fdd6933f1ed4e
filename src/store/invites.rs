//! Staff invite persistence.
//!
//! The plain token handed to the invitee is `{invite_id}.{secret}`; only a
//! SHA-256 hash of the whole token is stored, so a leaked table cannot be
//! replayed. Lookup hashes the presented token and matches on the unique
//! `token_hash` column. Transitions are one-way out of `pending`.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{Invite, Role};

const INVITE_COLUMNS: &str = "id, dealership_id, email, token_hash, role, invited_by, \
                              created_at, expires_at, used_at, status";

/// Invite lifetime in days.
const EXPIRY_DAYS: i64 = 7;

/// Token secret length in hex characters.
const SECRET_LEN: usize = 32;

/// Hash a plain token for storage or lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_secret() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..SECRET_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..HEX.len());
            char::from(HEX[idx])
        })
        .collect()
}

/// Create an invite. Returns the row plus the plain token — the only time
/// the token exists outside the invitee's message.
///
/// # Errors
///
/// Database failures propagate.
pub async fn create(
    pool: &PgPool,
    dealership_id: Uuid,
    email: &str,
    role: Role,
    invited_by: Uuid,
) -> Result<(Invite, String), GatewayError> {
    let id = Uuid::new_v4();
    let plain_token = format!("{id}.{}", generate_secret());
    let token_hash = hash_token(&plain_token);

    let invite = sqlx::query_as::<_, Invite>(&format!(
        "INSERT INTO invites \
         (id, dealership_id, email, token_hash, role, invited_by, status, \
          created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', now(), \
                 now() + make_interval(days => {EXPIRY_DAYS})) \
         RETURNING {INVITE_COLUMNS}"
    ))
    .bind(id)
    .bind(dealership_id)
    .bind(email)
    .bind(&token_hash)
    .bind(role)
    .bind(invited_by)
    .fetch_one(pool)
    .await?;

    Ok((invite, plain_token))
}

/// Verify a presented token: the matching invite must be pending and not
/// past its expiry.
///
/// # Errors
///
/// `NotFound` for unknown tokens, `Conflict` for used/cancelled/expired
/// invites; database failures propagate.
pub async fn verify(pool: &PgPool, token: &str) -> Result<Invite, GatewayError> {
    let token_hash = hash_token(token);
    let invite = sqlx::query_as::<_, Invite>(&format!(
        "SELECT {INVITE_COLUMNS} FROM invites WHERE token_hash = $1"
    ))
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| GatewayError::NotFound("invite".to_owned()))?;

    match invite.status {
        crate::types::InviteStatus::Pending => {
            if invite.expires_at <= chrono::Utc::now() {
                return Err(GatewayError::Conflict("invite has expired".to_owned()));
            }
            Ok(invite)
        }
        _ => Err(GatewayError::Conflict(
            "invite is no longer pending".to_owned(),
        )),
    }
}

/// Mark an invite accepted. One-way out of `pending`.
///
/// # Errors
///
/// `Conflict` when the invite already left `pending`; database failures
/// propagate.
pub async fn mark_accepted(pool: &PgPool, id: Uuid) -> Result<(), GatewayError> {
    let result = sqlx::query(
        "UPDATE invites SET status = 'accepted', used_at = now() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::Conflict(format!("invite {id} is not pending")));
    }
    Ok(())
}

/// Cancel a pending invite. One-way out of `pending`.
///
/// # Errors
///
/// `Conflict` when the invite already left `pending` or belongs to another
/// dealership; database failures propagate.
pub async fn cancel(pool: &PgPool, dealership_id: Uuid, id: Uuid) -> Result<(), GatewayError> {
    let result = sqlx::query(
        "UPDATE invites SET status = 'cancelled' \
         WHERE id = $1 AND dealership_id = $2 AND status = 'pending'",
    )
    .bind(id)
    .bind(dealership_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(GatewayError::Conflict(format!("invite {id} is not pending")));
    }
    Ok(())
}
