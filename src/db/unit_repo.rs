//! The narrow mutation this core is allowed on the warband catalog:
//! atomically add N to a unit's kill counter. Relative increments keep
//! a duplicate-finalization race harmless by construction.

use anyhow::{bail, Context, Result};
use sqlx::PgConnection;

use crate::battle::events::UnitKind;

pub async fn increment_kills(
    conn: &mut PgConnection,
    kind: UnitKind,
    unit_id: i64,
    count: i64,
) -> Result<()> {
    let table = match kind {
        UnitKind::Hero => "heroes",
        UnitKind::HiredSword => "hired_swords",
        UnitKind::Henchman => "henchmen",
        UnitKind::Custom => bail!("custom units have no catalog row"),
    };

    // Table name comes from the closed enum above, never from input.
    let rows = sqlx::query(&format!(
        "UPDATE {table} SET kills = kills + $1 WHERE id = $2"
    ))
    .bind(count)
    .bind(unit_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("incrementing kills for {table} {unit_id}"))?
    .rows_affected();

    if rows == 0 {
        // The unit may have been deleted since the kill was recorded;
        // losing the credit is preferable to failing the whole battle.
        log::warn!("kill aggregation: no {table} row with id {unit_id}");
    }
    Ok(())
}
