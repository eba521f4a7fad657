mod migrations;
mod state;

use crate::db::{Database, NewDownload};
use crate::types::{Download, Provider, TargetKind};

pub(super) fn bandcamp_track(url: &str) -> NewDownload {
    NewDownload {
        url: url.to_string(),
        provider: Provider::Bandcamp,
        target: TargetKind::Track,
    }
}

pub(super) async fn insert_n(db: &Database, n: usize) -> Vec<Download> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let download = db
            .insert_download(&bandcamp_track(&format!(
                "https://artist.bandcamp.com/track/song-{}",
                i
            )))
            .await
            .unwrap();
        out.push(download);
    }
    out
}

/// Shift a column of one row into the past, for staleness and retention tests
pub(super) async fn age_column(db: &Database, table: &str, column: &str, id: i64, secs: i64) {
    let sql = format!("UPDATE {table} SET {column} = {column} - ? WHERE id = ?");
    sqlx::query(&sql)
        .bind(secs)
        .bind(id)
        .execute(db.pool())
        .await
        .unwrap();
}
