use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Ledger: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id         INTEGER PRIMARY KEY,
                balance         INTEGER DEFAULT 0,
                role            TEXT DEFAULT 'user',
                referred_by     INTEGER,
                referral_count  INTEGER DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS inventory (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                credential  TEXT NOT NULL UNIQUE,
                secret      TEXT NOT NULL,
                status      TEXT DEFAULT 'available',
                buyer       INTEGER,
                sold_at     TEXT
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                seller            INTEGER NOT NULL,
                credential        TEXT NOT NULL,
                secret            TEXT NOT NULL,
                kind              TEXT NOT NULL,
                status            TEXT DEFAULT 'pending',
                rejection_reason  TEXT,
                created_at        TEXT DEFAULT (datetime('now'))
            );

            -- Withdrawals are not implemented. The table is kept so existing
            -- ledgers stay schema-compatible; nothing reads or writes it.
            CREATE TABLE IF NOT EXISTS withdrawal_requests (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id           INTEGER NOT NULL,
                amount            INTEGER NOT NULL,
                method            TEXT NOT NULL,
                phone             TEXT NOT NULL,
                status            TEXT DEFAULT 'pending',
                rejection_reason  TEXT,
                requested_at      TEXT DEFAULT (datetime('now')),
                processed_at      TEXT
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Ledger: running migration v2 (status indexes)");
        conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_inventory_status ON inventory(status);
            CREATE INDEX IF NOT EXISTS idx_inventory_buyer ON inventory(buyer, sold_at);
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Ledger migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'inventory', 'submissions', 'withdrawal_requests')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn column_defaults_match_legacy_layout() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        conn.execute("INSERT INTO users (user_id) VALUES (7)", []).unwrap();
        let (balance, role, count): (i64, String, i64) = conn
            .query_row(
                "SELECT balance, role, referral_count FROM users WHERE user_id = 7",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((balance, role.as_str(), count), (0, "user", 0));

        conn.execute(
            "INSERT INTO submissions (seller, credential, secret, kind) VALUES (7, 'a', 'b', 'inventory')",
            [],
        )
        .unwrap();
        let (status, created_at): (String, Option<String>) = conn
            .query_row("SELECT status, created_at FROM submissions", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(status, "pending");
        assert!(created_at.is_some());
    }
}
