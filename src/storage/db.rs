use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
};

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    // Handle special SQLite URL formats
    let db = if database_url == "sqlite::memory:" {
        // Every pooled connection gets its own private in-memory
        // database, so the pool must stay at a single connection.
        let mut options = ConnectOptions::new(database_url.to_string());
        options.max_connections(1).min_connections(1);
        Database::connect(options)
            .await
            .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {}", e)))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {}", e)))?;
            tracing::info!("Created database file: {}", path.display());
        }

        Database::connect(database_url)
            .await
            .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    };

    apply_migrations(&db).await?;

    Ok(db)
}

// Migrations run exactly once per database; the tracking table doubles as
// the first-run marker.
async fn apply_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let already_applied = db
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
        ))
        .await?
        .is_some();

    if already_applied {
        tracing::info!("Migrations already applied, skipping");
        return Ok(());
    }

    tracing::info!("First run: executing all migration SQL files");

    let migrations = [
        ("001_create_users", include_str!("../../migrations/001_create_users.sql")),
        ("002_create_conversations", include_str!("../../migrations/002_create_conversations.sql")),
        ("003_create_messages", include_str!("../../migrations/003_create_messages.sql")),
        (
            "004_create_message_embeddings",
            include_str!("../../migrations/004_create_message_embeddings.sql"),
        ),
        ("005_create_user_contexts", include_str!("../../migrations/005_create_user_contexts.sql")),
        (
            "006_create_conversation_summaries",
            include_str!("../../migrations/006_create_conversation_summaries.sql"),
        ),
        ("007_create_usage_records", include_str!("../../migrations/007_create_usage_records.sql")),
    ];

    for (version, sql) in migrations {
        db.execute_unprepared(sql).await?;
        tracing::info!("Applied migration {}", version);
    }

    db.execute_unprepared(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    for (version, _) in migrations {
        db.execute_unprepared(&format!(
            "INSERT INTO schema_migrations (version) VALUES ('{}')",
            version
        ))
        .await?;
    }

    Ok(())
}
