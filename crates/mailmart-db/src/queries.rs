use crate::models::{
    AddOutcome, DecideOutcome, Decision, InventoryCounts, InventoryRow, SubmissionRow, UserRow,
};
use crate::Database;
use anyhow::{Result, ensure};
use chrono::SecondsFormat;
use mailmart_types::models::{InventoryStatus, Role, SubmissionKind, SubmissionStatus, UserId};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, ffi};
use tracing::{debug, info, warn};

const USER_COLUMNS: &str =
    "user_id, COALESCE(balance, 0), COALESCE(role, 'user'), referred_by, COALESCE(referral_count, 0)";

const INVENTORY_COLUMNS: &str =
    "id, credential, secret, COALESCE(status, 'available'), buyer, sold_at";

const SUBMISSION_COLUMNS: &str =
    "id, seller, credential, secret, kind, COALESCE(status, 'pending'), rejection_reason, COALESCE(created_at, '')";

impl Database {
    // -- Users --

    /// Upsert the user with the admin role.
    pub fn promote_admin(&self, user_id: UserId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, role) VALUES (?1, 'admin')
                 ON CONFLICT(user_id) DO UPDATE SET role = 'admin'",
                [user_id],
            )?;
            debug!("User {} holds the admin role", user_id);
            Ok(())
        })
    }

    /// Register a user on first contact. A referral is credited only when the
    /// user is new and the referrer is another known user.
    /// Returns true if the user row was created by this call.
    pub fn register_user(&self, user_id: UserId, referrer: Option<UserId>) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let created = tx.execute(
                "INSERT OR IGNORE INTO users (user_id, role) VALUES (?1, 'user')",
                [user_id],
            )? == 1;

            if created {
                if let Some(referrer) = referrer.filter(|r| *r != user_id) {
                    let credited = tx.execute(
                        "UPDATE users SET referral_count = COALESCE(referral_count, 0) + 1
                         WHERE user_id = ?1",
                        [referrer],
                    )?;
                    if credited == 1 {
                        tx.execute(
                            "UPDATE users SET referred_by = ?2 WHERE user_id = ?1",
                            [user_id, referrer],
                        )?;
                        info!("User {} joined through referral of {}", user_id, referrer);
                    } else {
                        debug!("Ignoring unknown referrer {} for user {}", referrer, user_id);
                    }
                }
            }

            tx.commit()?;
            Ok(created)
        })
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, user_id))
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(user_id) FROM users", [], |r| r.get(0))?;
            Ok(count)
        })
    }

    // -- Inventory --

    pub fn add_inventory(&self, credential: &str, secret: &str) -> Result<AddOutcome> {
        self.with_conn(|conn| insert_inventory(conn, credential, secret))
    }

    /// Stock a batch of `(credential, secret)` pairs in one transaction.
    /// Duplicates are reported per pair; any other failure rolls back the
    /// whole batch.
    pub fn add_inventory_batch(&self, pairs: &[(String, String)]) -> Result<Vec<AddOutcome>> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut outcomes = Vec::with_capacity(pairs.len());
            for (credential, secret) in pairs {
                outcomes.push(insert_inventory(&tx, credential, secret)?);
            }
            tx.commit()?;
            Ok(outcomes)
        })
    }

    /// Hand up to `count` available records to `buyer`.
    ///
    /// Selection and the `available -> sold` flip happen in one conditional
    /// UPDATE inside an immediate transaction, so two concurrent callers can
    /// never receive the same row. Fewer rows than requested means the stock
    /// ran short.
    pub fn allocate(&self, buyer: UserId, count: u32) -> Result<Vec<InventoryRow>> {
        if count == 0 {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let sold_at = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

            let rows = {
                let mut stmt = tx.prepare(&format!(
                    "UPDATE inventory SET status = 'sold', buyer = ?1, sold_at = ?2
                     WHERE status = 'available'
                       AND id IN (SELECT id FROM inventory WHERE status = 'available' ORDER BY id LIMIT ?3)
                     RETURNING {}",
                    INVENTORY_COLUMNS
                ))?;
                stmt.query_map(rusqlite::params![buyer, sold_at, count], inventory_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.commit()?;

            info!("Allocated {} of {} requested records to user {}", rows.len(), count, buyer);
            Ok(rows)
        })
    }

    /// Delete by exact credential, whatever its status.
    pub fn remove_inventory(&self, credential: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM inventory WHERE credential = ?1", [credential])?;
            if removed > 0 {
                info!("Removed inventory credential {}", credential);
            } else {
                warn!("Inventory credential {} not found for removal", credential);
            }
            Ok(removed > 0)
        })
    }

    pub fn inventory_counts(&self) -> Result<InventoryCounts> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(status, 'available'), COUNT(*) FROM inventory GROUP BY 1",
            )?;
            let mut counts = InventoryCounts::default();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, n) = row?;
                match InventoryStatus::parse(&status) {
                    Some(InventoryStatus::Available) => counts.available += n,
                    Some(InventoryStatus::Sold) => counts.sold += n,
                    None => warn!("Inventory rows with unknown status '{}': {}", status, n),
                }
                counts.total += n;
            }
            Ok(counts)
        })
    }

    pub fn list_available_inventory(&self) -> Result<Vec<InventoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM inventory WHERE status = 'available' ORDER BY id",
                INVENTORY_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], inventory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The buyer's most recent purchases, newest first.
    pub fn recent_sales_to(&self, buyer: UserId, limit: u32) -> Result<Vec<InventoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM inventory WHERE buyer = ?1
                 ORDER BY sold_at DESC, id DESC LIMIT ?2",
                INVENTORY_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![buyer, limit], inventory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Submissions --

    /// Record a pending submission. Duplicate credentials are allowed here.
    pub fn submit(
        &self,
        seller: UserId,
        credential: &str,
        secret: &str,
        kind: SubmissionKind,
    ) -> Result<i64> {
        self.with_conn(|conn| insert_submission(conn, seller, credential, secret, kind))
    }

    /// Record a batch of submissions atomically: either every pair becomes a
    /// pending submission or none does.
    pub fn submit_batch(
        &self,
        seller: UserId,
        pairs: &[(String, String)],
        kind: SubmissionKind,
    ) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let mut ids = Vec::with_capacity(pairs.len());
            for (credential, secret) in pairs {
                ids.push(insert_submission(&tx, seller, credential, secret, kind)?);
            }
            tx.commit()?;
            Ok(ids)
        })
    }

    pub fn pending_submissions(&self) -> Result<Vec<SubmissionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM submissions WHERE status = 'pending' ORDER BY id",
                SUBMISSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], submission_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_submission(&self, id: i64) -> Result<Option<SubmissionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM submissions WHERE id = ?1",
                SUBMISSION_COLUMNS
            ))?;
            let row = stmt.query_row([id], submission_from_row).optional()?;
            Ok(row)
        })
    }

    /// Resolve a pending submission.
    ///
    /// The `status = 'pending'` guard is part of the UPDATE itself and the
    /// approval credit runs in the same transaction, so a submission is
    /// credited at most once however often this is called.
    pub fn decide(&self, id: i64, decision: &Decision) -> Result<DecideOutcome> {
        if let Decision::Reject { reason } = decision {
            ensure!(!reason.trim().is_empty(), "rejection reason must not be empty");
        }

        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let seller: Option<UserId> = match decision {
                Decision::Approve { .. } => tx
                    .query_row(
                        "UPDATE submissions SET status = 'approved'
                         WHERE id = ?1 AND status = 'pending' RETURNING seller",
                        [id],
                        |r| r.get(0),
                    )
                    .optional()?,
                Decision::Reject { reason } => tx
                    .query_row(
                        "UPDATE submissions SET status = 'rejected', rejection_reason = ?2
                         WHERE id = ?1 AND status = 'pending' RETURNING seller",
                        rusqlite::params![id, reason.trim()],
                        |r| r.get(0),
                    )
                    .optional()?,
            };

            let Some(seller) = seller else {
                let exists: Option<i64> = tx
                    .query_row("SELECT id FROM submissions WHERE id = ?1", [id], |r| r.get(0))
                    .optional()?;
                return Ok(if exists.is_some() {
                    warn!("Submission {} was already resolved", id);
                    DecideOutcome::AlreadyResolved
                } else {
                    warn!("Submission {} does not exist", id);
                    DecideOutcome::NotFound
                });
            };

            let balance = match decision {
                Decision::Approve { credit } => {
                    tx.execute("INSERT OR IGNORE INTO users (user_id) VALUES (?1)", [seller])?;
                    let balance: i64 = tx.query_row(
                        "UPDATE users SET balance = COALESCE(balance, 0) + ?2
                         WHERE user_id = ?1 RETURNING balance",
                        [seller, *credit],
                        |r| r.get(0),
                    )?;
                    Some(balance)
                }
                Decision::Reject { .. } => None,
            };

            tx.commit()?;

            match balance {
                Some(balance) => info!(
                    "Submission {} approved, user {} balance now {}",
                    id, seller, balance
                ),
                None => info!("Submission {} rejected for user {}", id, seller),
            }
            Ok(DecideOutcome::Applied { seller, balance })
        })
    }
}

fn insert_inventory(conn: &Connection, credential: &str, secret: &str) -> Result<AddOutcome> {
    let inserted = conn.execute(
        "INSERT INTO inventory (credential, secret) VALUES (?1, ?2)",
        (credential, secret),
    );

    match inserted {
        Ok(_) => {
            info!("Stocked inventory credential {}", credential);
            Ok(AddOutcome::Added)
        }
        // Only the UNIQUE(credential) index counts as a duplicate; trigger
        // aborts share the CONSTRAINT primary code.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            warn!("Inventory credential {} already stocked", credential);
            Ok(AddOutcome::Duplicate)
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_submission(
    conn: &Connection,
    seller: UserId,
    credential: &str,
    secret: &str,
    kind: SubmissionKind,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO submissions (seller, credential, secret, kind, status)
         VALUES (?1, ?2, ?3, ?4, 'pending')",
        rusqlite::params![seller, credential, secret, kind.as_str()],
    )?;
    let id = conn.last_insert_rowid();
    info!("Submission {} ({}) recorded for user {}", id, kind.as_str(), seller);
    Ok(id)
}

fn query_user(conn: &Connection, user_id: UserId) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS))?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                balance: row.get(1)?,
                role: Role::parse(&row.get::<_, String>(2)?),
                referred_by: row.get(3)?,
                referral_count: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn inventory_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryRow> {
    let status: String = row.get(3)?;
    Ok(InventoryRow {
        id: row.get(0)?,
        credential: row.get(1)?,
        secret: row.get(2)?,
        status: InventoryStatus::parse(&status).ok_or_else(|| bad_enum(3, &status))?,
        buyer: row.get(4)?,
        sold_at: row.get(5)?,
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    let kind: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(SubmissionRow {
        id: row.get(0)?,
        seller: row.get(1)?,
        credential: row.get(2)?,
        secret: row.get(3)?,
        kind: SubmissionKind::parse(&kind).ok_or_else(|| bad_enum(4, &kind))?,
        status: SubmissionStatus::parse(&status).ok_or_else(|| bad_enum(5, &status))?,
        rejection_reason: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn bad_enum(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("unexpected enum value '{}'", value).into(),
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
