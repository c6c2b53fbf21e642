use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{SeedNodeRow, SeedRow};
use crate::domain::{Seed, SeedNode};
use crate::errors::StoreError;

async fn load_nodes(pool: &SqlitePool, seed_id: &str) -> Result<Vec<SeedNode>, StoreError> {
    let rows = sqlx::query_as::<_, SeedNodeRow>(
        "SELECT * FROM seed_nodes WHERE seed_id = ? ORDER BY tier, node_id",
    )
    .bind(seed_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| SeedNode {
            id: r.node_id,
            tier: r.tier as i32,
            kind: r.kind,
            name: r.name,
        })
        .collect())
}

fn assemble(row: SeedRow, nodes: Vec<SeedNode>) -> Result<Seed, StoreError> {
    Ok(Seed {
        id: row.id.parse().map_err(|_| StoreError::NotFound)?,
        pool_name: row.pool_name,
        total_layers: row.total_layers as i32,
        nodes,
    })
}

pub async fn get_seed(pool: &SqlitePool, id: Uuid) -> Result<Option<Seed>, StoreError> {
    let row = sqlx::query_as::<_, SeedRow>("SELECT * FROM seeds WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let nodes = load_nodes(pool, &row.id).await?;
            Ok(Some(assemble(row, nodes)?))
        }
        None => Ok(None),
    }
}

/// Picks an unconsumed seed from `pool_name` and marks it consumed, so it is
/// not handed to a second race concurrently. Training sessions bypass this
/// path entirely — they never consume a seed.
pub async fn claim_seed(pool: &SqlitePool, pool_name: &str) -> Result<Option<Seed>, StoreError> {
    let row = sqlx::query_as::<_, SeedRow>(
        "SELECT * FROM seeds WHERE pool_name = ? AND consumed = 0 LIMIT 1",
    )
    .bind(pool_name)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let result = sqlx::query("UPDATE seeds SET consumed = 1 WHERE id = ? AND consumed = 0")
        .bind(&row.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        // Lost a race against another claimant; caller may retry.
        return Ok(None);
    }

    let nodes = load_nodes(pool, &row.id).await?;
    Ok(Some(assemble(row, nodes)?))
}

/// Returns a previously claimed seed back to the pool (used by `reroll_seed`
/// when replacing a race's current seed).
pub async fn release_seed(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE seeds SET consumed = 0 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetches any seed by id regardless of pool name, bypassing consumption —
/// used by the training runtime, which never marks a seed consumed.
pub async fn get_seed_for_training(pool: &SqlitePool, id: Uuid) -> Result<Option<Seed>, StoreError> {
    get_seed(pool, id).await
}
