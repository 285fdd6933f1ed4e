//! Conversation turn persistence. Append-only; ordered by `created_at`
//! ascending with ties broken by id.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::{ConversationTurn, Sender};

/// Append one turn to a lead's history.
///
/// # Errors
///
/// Database failures propagate.
pub async fn append(
    pool: &PgPool,
    lead_id: Uuid,
    sender: Sender,
    message: &str,
) -> Result<ConversationTurn, GatewayError> {
    let turn = sqlx::query_as::<_, ConversationTurn>(
        "INSERT INTO conversations (id, lead_id, sender, message, created_at) \
         VALUES ($1, $2, $3, $4, now()) \
         RETURNING id, lead_id, sender, message, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(lead_id)
    .bind(sender)
    .bind(message)
    .fetch_one(pool)
    .await?;
    Ok(turn)
}

/// Full history for a lead, oldest first.
///
/// # Errors
///
/// Database failures propagate.
pub async fn history(pool: &PgPool, lead_id: Uuid) -> Result<Vec<ConversationTurn>, GatewayError> {
    let turns = sqlx::query_as::<_, ConversationTurn>(
        "SELECT id, lead_id, sender, message, created_at \
         FROM conversations WHERE lead_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(lead_id)
    .fetch_all(pool)
    .await?;
    Ok(turns)
}
