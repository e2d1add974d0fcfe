//! SQLite connection pooling.
//!
//! The server has one serialized writer (the job scheduler runs a single
//! task at a time) and a handful of read-mostly API handlers, so a small
//! r2d2 pool over WAL-mode SQLite covers it: readers never block the
//! writer, and `busy_timeout` absorbs the rare write overlap between a
//! running scan and a config/route write.

use cur_core::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// One writer slot plus a few readers; scans hold a connection for the
/// whole pass, API handlers grab and release per request.
const POOL_SIZE: u32 = 4;

fn prepare_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    // journal_mode returns a row, so execute_batch rather than execute.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .map_err(|e| Error::database(format!("connection pool init failed: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    Ok(pool)
}

/// Open (creating if absent) the database file at `db_path`, apply the
/// connection pragmas to every pooled connection, and bring the schema up
/// to date.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    build_pool(SqliteConnectionManager::file(db_path).with_init(prepare_connection))
}

/// In-memory pool for tests. Each call gets its own shared-cache URI so
/// concurrently running tests never see each other's tables, while the
/// connections within one pool all share the same database.
pub fn init_memory_pool() -> Result<DbPool> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_DB: AtomicU64 = AtomicU64::new(0);

    let uri = format!(
        "file:curatorr_test_{}?mode=memory&cache=shared",
        NEXT_DB.fetch_add(1, Ordering::Relaxed)
    );
    // WAL is meaningless for in-memory databases; keep the rest.
    let manager = SqliteConnectionManager::file(uri).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    build_pool(manager)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("connection checkout failed: {e}")))
}
