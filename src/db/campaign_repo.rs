//! Read-only view onto the campaign tables this core does not own:
//! membership checks and the one-warband-per-user lookup used when a
//! battle is created.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Which of the given users are members of the campaign.
pub async fn members_of(
    db: &PgPool,
    campaign_id: Uuid,
    user_ids: &[Uuid],
) -> Result<HashSet<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM campaign_members WHERE campaign_id = $1 AND user_id = ANY($2)",
    )
    .bind(campaign_id)
    .bind(user_ids)
    .fetch_all(db)
    .await
    .context("checking campaign membership")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// user → all warbands they own in this campaign. Battle creation
/// requires exactly one per user.
pub async fn warbands_of(
    db: &PgPool,
    campaign_id: Uuid,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Uuid>>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT user_id, id FROM warbands WHERE campaign_id = $1 AND user_id = ANY($2)",
    )
    .bind(campaign_id)
    .bind(user_ids)
    .fetch_all(db)
    .await
    .context("fetching campaign warbands")?;

    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (user, warband) in rows {
        map.entry(user).or_default().push(warband);
    }
    Ok(map)
}

/// Single-user membership check (state / listing endpoints).
pub async fn is_member(db: &PgPool, campaign_id: Uuid, user_id: Uuid) -> Result<bool> {
    let exists: Option<bool> = sqlx::query_scalar(
        "SELECT EXISTS(
             SELECT 1 FROM campaign_members WHERE campaign_id = $1 AND user_id = $2)",
    )
    .bind(campaign_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .context("checking campaign membership")?;
    Ok(exists.unwrap_or(false))
}
