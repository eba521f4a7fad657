use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_shutdown_state_initial() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Nothing ran before a fresh database, so there is nothing to recover
    assert!(!db.was_unclean_shutdown().await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_shutdown_state_clean_lifecycle() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.set_clean_start().await.unwrap();
    assert!(
        db.was_unclean_shutdown().await.unwrap(),
        "running engine has not shut down yet"
    );

    db.set_clean_shutdown().await.unwrap();
    assert!(!db.was_unclean_shutdown().await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_shutdown_state_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    // First session starts and is killed
    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.set_clean_start().await.unwrap();
        db.close().await;
    }
    {
        let db = Database::new(temp_file.path()).await.unwrap();
        assert!(db.was_unclean_shutdown().await.unwrap());
        db.set_clean_start().await.unwrap();
        db.set_clean_shutdown().await.unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    assert!(!db.was_unclean_shutdown().await.unwrap());
    db.close().await;
}
