//! Versioned schema migrations for the SQLite garage store
//!
//! Migrations are applied exactly once, in order, each inside its own
//! transaction. Applied versions are tracked in `schema_migrations`.
//!
//! Identifiers are stored as TEXT uuids, timestamps as RFC 3339 TEXT and
//! money or quantities as decimal TEXT so no precision is lost to REAL.

use gixat_core::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// A single schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique version number (must be sequential)
    pub version: i32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to execute for this migration
    pub up_sql: &'static str,
}

/// All migrations in order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create organizations, users, invites and media",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS media (
                id TEXT PRIMARY KEY,
                organization_id TEXT,
                key TEXT NOT NULL,
                alt TEXT,
                media_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                address_country TEXT,
                address_city TEXT,
                address_street TEXT,
                address_phone_country_code TEXT,
                logo_id TEXT REFERENCES media(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL COLLATE NOCASE,
                full_name TEXT NOT NULL,
                user_type TEXT NOT NULL,
                role TEXT NOT NULL,
                organization_id TEXT REFERENCES organizations(id),
                phone_number TEXT,
                bio TEXT,
                avatar_key TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_organization ON users(organization_id);

            CREATE TABLE IF NOT EXISTS user_invites (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                email TEXT NOT NULL,
                role TEXT NOT NULL,
                invite_code TEXT NOT NULL,
                expiry_date TEXT NOT NULL,
                status TEXT NOT NULL,
                invited_by_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_user_invites_code ON user_invites(invite_code);
            CREATE INDEX IF NOT EXISTS idx_user_invites_org ON user_invites(organization_id, created_at DESC);
        "#,
    },
    Migration {
        version: 2,
        description: "Create customers and cars",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT,
                phone_number TEXT NOT NULL,
                address_country TEXT,
                address_city TEXT,
                address_street TEXT,
                address_phone_country_code TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_org_phone
            ON customers(organization_id, phone_number);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_org_email
            ON customers(organization_id, email) WHERE email IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_customers_org_name
            ON customers(organization_id, last_name, first_name);

            CREATE TABLE IF NOT EXISTS cars (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                customer_id TEXT NOT NULL REFERENCES customers(id),
                make TEXT NOT NULL,
                model TEXT NOT NULL,
                year INTEGER NOT NULL,
                license_plate TEXT NOT NULL,
                vin TEXT,
                color TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_cars_org_plate
            ON cars(organization_id, license_plate);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_cars_org_vin
            ON cars(organization_id, vin) WHERE vin IS NOT NULL;

            CREATE INDEX IF NOT EXISTS idx_cars_customer ON cars(customer_id);
        "#,
    },
    Migration {
        version: 3,
        description: "Create garage sessions, session logs and session media",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS garage_sessions (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                car_id TEXT NOT NULL REFERENCES cars(id),
                customer_id TEXT NOT NULL REFERENCES customers(id),
                status TEXT NOT NULL,
                mileage INTEGER,
                customer_requests TEXT,
                intake_notes TEXT,
                intake_requests TEXT,
                inspection_notes TEXT,
                inspection_requests TEXT,
                test_drive_notes TEXT,
                test_drive_requests TEXT,
                initial_report TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_org_created
            ON garage_sessions(organization_id, created_at DESC);

            CREATE INDEX IF NOT EXISTS idx_sessions_car_status
            ON garage_sessions(car_id, status);

            CREATE TABLE IF NOT EXISTS session_logs (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES garage_sessions(id) ON DELETE CASCADE,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                notes TEXT,
                changed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_logs_session
            ON session_logs(session_id, changed_at);

            CREATE TABLE IF NOT EXISTS session_media (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES garage_sessions(id) ON DELETE CASCADE,
                media_id TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
                stage TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_media_session ON session_media(session_id);
        "#,
    },
    Migration {
        version: 4,
        description: "Create job cards, job items, inventory, parts and labor",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS job_cards (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                session_id TEXT REFERENCES garage_sessions(id),
                car_id TEXT NOT NULL REFERENCES cars(id),
                customer_id TEXT NOT NULL REFERENCES customers(id),
                assigned_technician_id TEXT REFERENCES users(id),
                status TEXT NOT NULL,
                internal_notes TEXT,
                total_estimated_cost TEXT NOT NULL DEFAULT '0',
                total_actual_cost TEXT NOT NULL DEFAULT '0',
                total_estimated_labor TEXT NOT NULL DEFAULT '0',
                total_actual_labor TEXT NOT NULL DEFAULT '0',
                total_estimated_parts TEXT NOT NULL DEFAULT '0',
                total_actual_parts TEXT NOT NULL DEFAULT '0',
                is_approved_by_customer INTEGER NOT NULL DEFAULT 0,
                approved_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_cards_org_created
            ON job_cards(organization_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS job_items (
                id TEXT PRIMARY KEY,
                job_card_id TEXT NOT NULL REFERENCES job_cards(id) ON DELETE CASCADE,
                assigned_technician_id TEXT REFERENCES users(id),
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                estimated_labor_cost TEXT NOT NULL DEFAULT '0',
                estimated_parts_cost TEXT NOT NULL DEFAULT '0',
                actual_labor_cost TEXT NOT NULL DEFAULT '0',
                actual_parts_cost TEXT NOT NULL DEFAULT '0',
                is_approved_by_customer INTEGER NOT NULL DEFAULT 0,
                approved_at TEXT,
                technician_notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_items_card ON job_items(job_card_id, created_at);

            CREATE TABLE IF NOT EXISTS job_card_media (
                job_card_id TEXT NOT NULL REFERENCES job_cards(id) ON DELETE CASCADE,
                media_id TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
                media_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (job_card_id, media_id)
            );

            CREATE TABLE IF NOT EXISTS job_item_media (
                job_item_id TEXT NOT NULL REFERENCES job_items(id) ON DELETE CASCADE,
                media_id TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
                media_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (job_item_id, media_id)
            );

            CREATE TABLE IF NOT EXISTS inventory_items (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                part_number TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                category TEXT,
                unit_of_measure TEXT NOT NULL DEFAULT 'piece',
                quantity_in_stock TEXT NOT NULL DEFAULT '0',
                minimum_stock_level TEXT NOT NULL DEFAULT '0',
                cost_price TEXT NOT NULL DEFAULT '0',
                selling_price TEXT NOT NULL DEFAULT '0',
                supplier TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_inventory_org_part_number
            ON inventory_items(organization_id, part_number);

            CREATE TABLE IF NOT EXISTS job_item_parts (
                id TEXT PRIMARY KEY,
                job_item_id TEXT NOT NULL REFERENCES job_items(id) ON DELETE CASCADE,
                inventory_item_id TEXT NOT NULL REFERENCES inventory_items(id),
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                discount TEXT NOT NULL DEFAULT '0',
                is_actual INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_item_parts_item ON job_item_parts(job_item_id);

            CREATE TABLE IF NOT EXISTS labor_entries (
                id TEXT PRIMARY KEY,
                job_item_id TEXT NOT NULL REFERENCES job_items(id) ON DELETE CASCADE,
                technician_id TEXT NOT NULL REFERENCES users(id),
                start_time TEXT NOT NULL,
                end_time TEXT,
                hours_worked TEXT NOT NULL DEFAULT '0',
                hourly_rate TEXT NOT NULL DEFAULT '0',
                labor_type TEXT,
                description TEXT,
                is_actual INTEGER NOT NULL DEFAULT 0,
                is_billable INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_labor_entries_item ON labor_entries(job_item_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_labor_entries_technician ON labor_entries(technician_id, start_time DESC);
        "#,
    },
    Migration {
        version: 5,
        description: "Create job card comments and mentions",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS job_card_comments (
                id TEXT PRIMARY KEY,
                job_card_id TEXT NOT NULL REFERENCES job_cards(id) ON DELETE CASCADE,
                job_item_id TEXT REFERENCES job_items(id) ON DELETE SET NULL,
                author_id TEXT NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                parent_comment_id TEXT REFERENCES job_card_comments(id),
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_card ON job_card_comments(job_card_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON job_card_comments(parent_comment_id);

            CREATE TABLE IF NOT EXISTS job_card_comment_mentions (
                id TEXT PRIMARY KEY,
                comment_id TEXT NOT NULL REFERENCES job_card_comments(id) ON DELETE CASCADE,
                mentioned_user_id TEXT NOT NULL REFERENCES users(id),
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mentions_user_unread
            ON job_card_comment_mentions(mentioned_user_id, is_read);
        "#,
    },
    Migration {
        version: 6,
        description: "Create appointments",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                customer_id TEXT NOT NULL REFERENCES customers(id),
                car_id TEXT NOT NULL REFERENCES cars(id),
                session_id TEXT REFERENCES garage_sessions(id),
                scheduled_start_time TEXT NOT NULL,
                scheduled_end_time TEXT NOT NULL,
                assigned_technician_id TEXT REFERENCES users(id),
                appointment_type TEXT NOT NULL,
                status TEXT NOT NULL,
                service_requested TEXT,
                customer_notes TEXT,
                internal_notes TEXT,
                estimated_duration_minutes INTEGER NOT NULL DEFAULT 60,
                contact_phone TEXT,
                contact_email TEXT,
                reminder_sent INTEGER NOT NULL DEFAULT 0,
                reminder_sent_at TEXT,
                cancelled_at TEXT,
                cancellation_reason TEXT,
                created_by_id TEXT REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_appointments_org_start
            ON appointments(organization_id, scheduled_start_time);

            CREATE INDEX IF NOT EXISTS idx_appointments_customer
            ON appointments(customer_id, scheduled_start_time);
        "#,
    },
    Migration {
        version: 7,
        description: "Create lookup items",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS lookup_items (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                value TEXT NOT NULL,
                parent_id TEXT REFERENCES lookup_items(id),
                metadata TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_lookup_category
            ON lookup_items(category, sort_order, value);

            CREATE INDEX IF NOT EXISTS idx_lookup_parent ON lookup_items(parent_id);
        "#,
    },
];

/// Run all pending migrations
///
/// Creates a `schema_migrations` table to track which migrations have been applied,
/// then runs any migrations that haven't been applied yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Database(format!("Failed to create schema_migrations table: {}", e)))?;

    let applied_versions: Vec<i32> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to fetch applied migrations: {}", e)))?;

    debug!(
        "Found {} applied migrations: {:?}",
        applied_versions.len(),
        applied_versions
    );

    for migration in MIGRATIONS {
        if applied_versions.contains(&migration.version) {
            debug!(
                "Skipping migration {}: {} (already applied)",
                migration.version, migration.description
            );
            continue;
        }

        info!(
            "Applying migration {}: {}",
            migration.version, migration.description
        );

        let mut tx = pool.begin().await.map_err(|e| {
            Error::Database(format!(
                "Failed to start migration {}: {}",
                migration.version, e
            ))
        })?;

        sqlx::raw_sql(migration.up_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(format!(
                    "Failed to apply migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, description) VALUES (?, ?)
                ON CONFLICT (version) DO NOTHING",
        )
        .bind(migration.version)
        .bind(migration.description)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to record migration {}: {}",
                migration.version, e
            ))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(format!(
                "Failed to commit migration {}: {}",
                migration.version, e
            ))
        })?;

        info!(
            "Successfully applied migration {}: {}",
            migration.version, migration.description
        );
    }

    Ok(())
}

/// Highest applied migration version, if any
pub async fn current_version(pool: &SqlitePool) -> Result<Option<i32>> {
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get current schema version: {}", e)))?;

    Ok(version)
}
