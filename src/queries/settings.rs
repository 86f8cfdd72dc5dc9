use crate::{
    error::{Error, Result},
    models::setting::Setting,
    DbConn,
};
use std::collections::HashMap;

pub async fn get_value(conn: &mut DbConn, key: &str) -> Result<Option<String>> {
    let row = sqlx::query!("SELECT value FROM settings WHERE key = $1", key)
        .fetch_optional(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(row.map(|r| r.value))
}

pub async fn create_or_update(conn: &mut DbConn, key: &str, value: &str) -> Result<Setting> {
    let setting = sqlx::query_as!(
        Setting,
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (key) DO UPDATE
        SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
        RETURNING key, value, updated_at
        "#,
        key,
        value,
    )
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(setting)
}

pub async fn get_all_as_dict(conn: &mut DbConn) -> Result<HashMap<String, String>> {
    let rows = sqlx::query!("SELECT key, value FROM settings")
        .fetch_all(conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(rows.into_iter().map(|r| (r.key, r.value)).collect())
}
