use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::CasterRow;
use crate::domain::Caster;
use crate::errors::StoreError;

fn assemble(row: CasterRow) -> Result<Caster, StoreError> {
    Ok(Caster {
        race_id: row.race_id.parse().map_err(|_| StoreError::NotFound)?,
        user_id: row.user_id.parse().map_err(|_| StoreError::NotFound)?,
        display_name: row.display_name,
    })
}

pub async fn list_casters(pool: &SqlitePool, race_id: Uuid) -> Result<Vec<Caster>, StoreError> {
    let rows = sqlx::query_as::<_, CasterRow>(
        "SELECT * FROM casters WHERE race_id = ? ORDER BY display_name",
    )
    .bind(race_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(assemble).collect()
}

pub async fn add_caster(
    pool: &SqlitePool,
    race_id: Uuid,
    user_id: Uuid,
    display_name: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT OR REPLACE INTO casters (race_id, user_id, display_name) VALUES (?, ?, ?)",
    )
    .bind(race_id.to_string())
    .bind(user_id.to_string())
    .bind(display_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_caster(pool: &SqlitePool, race_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM casters WHERE race_id = ? AND user_id = ?")
        .bind(race_id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
