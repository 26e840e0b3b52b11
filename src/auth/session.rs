use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::posts::Identity;

/// Create a new session for an account. Returns the session token.
pub fn create_session(
    conn: &Connection,
    account_id: &str,
    hours: u64,
) -> Result<String, rusqlite::Error> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Look up the account behind a live session token.
pub fn find_session(conn: &Connection, token: &str) -> Result<Option<Identity>, rusqlite::Error> {
    conn.query_row(
        "SELECT a.id, a.username FROM sessions s \
         JOIN accounts a ON a.id = s.account_id \
         WHERE s.token = ?1 AND s.expires_at > datetime('now')",
        params![token],
        |row| Ok(Identity::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )
    .optional()
}

/// Delete a session by token. Returns whether one existed.
pub fn delete_session(conn: &Connection, token: &str) -> Result<bool, rusqlite::Error> {
    let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(rows > 0)
}

/// Remove sessions past their expiry. Returns the number deleted.
pub fn purge_expired(conn: &Connection) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn test_conn() -> (r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO accounts (id, username, password_hash) VALUES ('1', 'user1', 'x')",
            [],
        )
        .unwrap();
        (conn, tmp)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn created_session_resolves_to_account() {
        let (conn, _tmp) = test_conn();
        let token = create_session(&conn, "1", 1).unwrap();
        let identity = find_session(&conn, &token).unwrap().unwrap();
        assert_eq!(identity, Identity::new("1", "user1"));
    }

    #[test]
    fn expired_session_does_not_resolve() {
        let (conn, _tmp) = test_conn();
        conn.execute(
            "INSERT INTO sessions (id, account_id, token, expires_at) VALUES ('s1', '1', 'stale', datetime('now', '-1 hours'))",
            [],
        )
        .unwrap();
        assert_eq!(find_session(&conn, "stale").unwrap(), None);
    }

    #[test]
    fn deleted_session_does_not_resolve() {
        let (conn, _tmp) = test_conn();
        let token = create_session(&conn, "1", 1).unwrap();
        assert!(delete_session(&conn, &token).unwrap());
        assert!(!delete_session(&conn, &token).unwrap());
        assert_eq!(find_session(&conn, &token).unwrap(), None);
    }

    #[test]
    fn purge_removes_only_expired_sessions() {
        let (conn, _tmp) = test_conn();
        conn.execute(
            "INSERT INTO sessions (id, account_id, token, expires_at) VALUES ('s1', '1', 'stale', datetime('now', '-1 hours'))",
            [],
        )
        .unwrap();
        let live = create_session(&conn, "1", 1).unwrap();

        assert_eq!(purge_expired(&conn).unwrap(), 1);
        assert_eq!(purge_expired(&conn).unwrap(), 0);
        assert!(find_session(&conn, &live).unwrap().is_some());

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
