use reqwest::Client;
use sqlx::SqlitePool;
use tracing::info;

use crate::dto::hero_dto::{Hero, RemoteHero};

pub async fn load_heroes(pool: &SqlitePool) -> Result<Vec<Hero>, sqlx::Error> {
    sqlx::query_as::<_, Hero>("SELECT id, name FROM heroes ORDER BY id")
        .fetch_all(pool)
        .await
}

/**
 * Pulls the hero list from the remote roster source.
 */
pub async fn fetch_remote_heroes(client: &Client, url: &str) -> Result<Vec<Hero>, reqwest::Error> {
    let remote: Vec<RemoteHero> = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    info!("Fetched {} heroes from {}", remote.len(), url);
    Ok(remote.into_iter().map(Hero::from).collect())
}

pub async fn save_heroes(pool: &SqlitePool, heroes: &[Hero]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for hero in heroes {
        sqlx::query(
            r#"
            INSERT INTO heroes (id, name)
            VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name
            "#,
        )
        .bind(hero.id)
        .bind(&hero.name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
