// 🗄️ SQLite account registry
//
// Tables:
// - signers: one row per signer (accounts are signers)
// - accounts: alias + JSON tag blob, keyed by the signer id
// - account_control_programs: every control program issued to a signer,
//   flagged when it was issued for change outputs
//
// A lookup is a single statement over `rarray(?1)`, whatever the key count.

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use super::{AccountRegistry, LookupContext, ProgramAccount};
use crate::error::RegistryError;

/// SQLite VM instructions between cancellation checks
const PROGRESS_OPS: i32 = 1000;

const RESOLVE_QUERY: &str = "
    SELECT account_control_programs.signer_id,
           account_control_programs.control_program,
           account_control_programs.change,
           accounts.alias,
           accounts.tags
    FROM account_control_programs
    LEFT JOIN signers ON signers.id = account_control_programs.signer_id
    LEFT JOIN accounts ON accounts.account_id = signers.id
    WHERE account_control_programs.control_program IN rarray(?1)
";

pub struct SqliteRegistry {
    conn: Connection,
}

/// Create registry tables and indexes
pub fn setup_registry(conn: &Connection, wal: bool) -> Result<(), RegistryError> {
    if wal {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS signers (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL DEFAULT 'account',
            quorum INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            alias TEXT UNIQUE,
            tags BLOB
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS account_control_programs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signer_id TEXT NOT NULL,
            control_program BLOB NOT NULL UNIQUE,
            change BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_acp_signer ON account_control_programs(signer_id)",
        [],
    )?;

    Ok(())
}

impl SqliteRegistry {
    /// Open (and initialize) a registry database file
    pub fn open(path: &Path, wal: bool) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        setup_registry(&conn, wal)?;
        SqliteRegistry::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory()?;
        setup_registry(&conn, false)?;
        SqliteRegistry::from_connection(conn)
    }

    /// Wrap an existing connection whose schema is already set up
    pub fn from_connection(conn: Connection) -> Result<Self, RegistryError> {
        rusqlite::vtab::array::load_module(&conn)?;
        Ok(SqliteRegistry { conn })
    }

    // ========================================================================
    // WRITES (seeding the registry)
    // ========================================================================

    /// Insert or update an account and its signer row
    ///
    /// A `None` alias or tags keeps whatever the account already has.
    pub fn upsert_account(
        &self,
        account_id: &str,
        alias: Option<&str>,
        tags: Option<&[u8]>,
    ) -> Result<(), RegistryError> {
        self.ensure_signer(account_id)?;
        self.conn.execute(
            "INSERT INTO accounts (account_id, alias, tags) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id) DO UPDATE SET
                 alias = COALESCE(excluded.alias, accounts.alias),
                 tags = COALESCE(excluded.tags, accounts.tags)",
            params![account_id, alias, tags],
        )?;
        Ok(())
    }

    /// Create an account with a fresh id
    pub fn create_account(
        &self,
        alias: Option<&str>,
        tags: Option<&[u8]>,
    ) -> Result<String, RegistryError> {
        let account_id = uuid::Uuid::new_v4().to_string();
        self.upsert_account(&account_id, alias, tags)?;
        Ok(account_id)
    }

    /// Issue a control program to a signer
    ///
    /// Returns false when the program was already registered.
    pub fn add_control_program(
        &self,
        signer_id: &str,
        program: &[u8],
        is_change: bool,
    ) -> Result<bool, RegistryError> {
        self.ensure_signer(signer_id)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO account_control_programs (signer_id, control_program, change)
             VALUES (?1, ?2, ?3)",
            params![signer_id, program, is_change],
        )?;
        Ok(inserted > 0)
    }

    pub fn account_id_for_alias(&self, alias: &str) -> Result<Option<String>, RegistryError> {
        let id = self
            .conn
            .query_row(
                "SELECT account_id FROM accounts WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn count_control_programs(&self) -> Result<i64, RegistryError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM account_control_programs",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn ensure_signer(&self, signer_id: &str) -> Result<(), RegistryError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO signers (id) VALUES (?1)",
            params![signer_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    fn query_programs(&self, programs: &[Vec<u8>]) -> rusqlite::Result<Vec<ProgramAccount>> {
        let keys: Rc<Vec<Value>> = Rc::new(
            programs
                .iter()
                .map(|program| Value::Blob(program.clone()))
                .collect(),
        );

        let mut stmt = self.conn.prepare_cached(RESOLVE_QUERY)?;
        let rows = stmt
            .query_map(params![keys], |row| {
                let account_id: Option<String> = row.get(0)?;
                let Some(account_id) = account_id else {
                    return Ok(None);
                };

                let tags = match row.get_ref(4)? {
                    ValueRef::Null => None,
                    ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(bytes.to_vec()),
                    other => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            4,
                            "tags".to_string(),
                            other.data_type(),
                        ))
                    }
                };

                Ok(Some(ProgramAccount {
                    account_id,
                    control_program: row.get(1)?,
                    is_change: row.get(2)?,
                    alias: row.get(3)?,
                    tags,
                }))
            })?
            .filter_map(Result::transpose)
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}

impl AccountRegistry for SqliteRegistry {
    fn resolve(
        &self,
        programs: &[Vec<u8>],
        ctx: &LookupContext,
    ) -> Result<Vec<ProgramAccount>, RegistryError> {
        ctx.check()?;

        let watcher = ctx.clone();
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || watcher.check().is_err()));
        let result = self.query_programs(programs);
        self.conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Ok(rows) => {
                debug!(keys = programs.len(), rows = rows.len(), "registry lookup");
                Ok(rows)
            }
            Err(e) => {
                // An interrupted statement surfaces as a generic sqlite error
                ctx.check()?;
                Err(RegistryError::Sqlite(e))
            }
        }
    }
}
