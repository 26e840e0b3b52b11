use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

use crate::auth::AuthError;
use crate::config::AccountConfig;
use crate::posts::Identity;

/// Bring the `accounts` table in line with the configured accounts.
///
/// Passwords are re-hashed only when the stored hash no longer verifies, so
/// restarts stay cheap. Accounts missing from the config are removed along
/// with their sessions. Returns the number of accounts written.
pub fn sync_accounts(
    conn: &mut Connection,
    accounts: &[AccountConfig],
    cost: u32,
) -> Result<usize, AuthError> {
    let tx = conn.transaction()?;
    let mut written = 0;

    for account in accounts {
        let stored: Option<(String, String)> = tx
            .query_row(
                "SELECT username, password_hash FROM accounts WHERE id = ?1",
                params![account.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let up_to_date = match stored {
            Some((ref username, ref hash)) => {
                *username == account.username
                    && bcrypt::verify(&account.password, hash).unwrap_or(false)
            }
            None => false,
        };
        if up_to_date {
            continue;
        }

        let hash = bcrypt::hash(&account.password, cost)?;
        tx.execute(
            "INSERT INTO accounts (id, username, password_hash, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
               username = excluded.username,
               password_hash = excluded.password_hash,
               updated_at = excluded.updated_at",
            params![account.id, account.username, hash],
        )?;
        tracing::info!(account_id = %account.id, username = %account.username, "Synced account");
        written += 1;
    }

    let configured: HashSet<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
    let stored_ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM accounts")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };
    for id in stored_ids.iter().filter(|id| !configured.contains(id.as_str())) {
        tx.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        tracing::info!(account_id = %id, "Removed account no longer in config");
    }

    tx.commit()?;
    Ok(written)
}

/// Check a username/password pair against the stored bcrypt hash.
pub fn verify_password(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<Identity, AuthError> {
    let stored: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM accounts WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, hash)) = stored else {
        return Err(AuthError::InvalidCredentials);
    };
    if bcrypt::verify(password, &hash)? {
        Ok(Identity::new(id, username))
    } else {
        Err(AuthError::InvalidCredentials)
    }
}
