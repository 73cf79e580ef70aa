use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::auth::Session;
use crate::error::{StoreError, StoreResult};
use crate::models::Card;

/// Creates tables on the given connection.
pub fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            salt            TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS sessions (
            token           TEXT PRIMARY KEY,
            user_id         INTEGER NOT NULL REFERENCES users(id),
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS cards (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             INTEGER NOT NULL REFERENCES users(id),
            name                TEXT NOT NULL,
            annual_fee          REAL NOT NULL DEFAULT 0.0,
            min_spend           REAL NOT NULL DEFAULT 0.0,
            min_spend_period    INTEGER NOT NULL DEFAULT 90,
            welcome_bonus       REAL NOT NULL DEFAULT 0.0,
            reward_rate         REAL NOT NULL DEFAULT 1.0,
            reward_multiplier   REAL NOT NULL DEFAULT 1.0,
            point_value         REAL NOT NULL DEFAULT 0.01,
            special_categories  TEXT NOT NULL DEFAULT '[]',
            bonus_tiers         TEXT NOT NULL DEFAULT '[]',
            partner_bonuses     TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// Opens (or creates) the SQLite database file and ensures tables exist.
pub fn init_db(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    init_tables(&conn)?;
    Ok(conn)
}

/// Stored credentials for a user
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
}

pub fn insert_user(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    salt: &str,
) -> StoreResult<i64> {
    let result = conn.execute(
        "INSERT INTO users (email, password_hash, salt) VALUES (?1, ?2, ?3)",
        params![email, password_hash, salt],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::UserExists(email.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> StoreResult<Option<UserRecord>> {
    let user = conn
        .query_row(
            "SELECT id, email, password_hash, salt FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    salt: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn insert_session(conn: &Connection, token: &str, user_id: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id) VALUES (?1, ?2)",
        params![token, user_id],
    )?;
    Ok(())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        token: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
    })
}

/// Looks up an active session by its token.
pub fn find_session(conn: &Connection, token: &str) -> StoreResult<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT s.token, s.user_id, u.email
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1 AND s.active = 1",
            params![token],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

/// The most recently created active session, if any.
pub fn latest_session(conn: &Connection) -> StoreResult<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT s.token, s.user_id, u.email
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.active = 1
             ORDER BY s.created_at DESC, s.rowid DESC
             LIMIT 1",
            [],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

pub fn deactivate_session(conn: &Connection, token: &str) -> StoreResult<bool> {
    let changed = conn.execute(
        "UPDATE sessions SET active = 0 WHERE token = ?1 AND active = 1",
        params![token],
    )?;
    Ok(changed > 0)
}

/// Saves a card for the session's user and returns its new id.
pub fn add_card(conn: &Connection, session: &Session, card: &Card) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO cards (user_id, name, annual_fee, min_spend, min_spend_period,
                            welcome_bonus, reward_rate, reward_multiplier, point_value,
                            special_categories, bonus_tiers, partner_bonuses)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            session.user_id,
            card.name,
            card.annual_fee,
            card.min_spend,
            card.min_spend_period,
            card.welcome_bonus,
            card.reward_rate,
            card.reward_multiplier,
            card.point_value,
            serde_json::to_string(&card.special_categories)?,
            serde_json::to_string(&card.bonus_tiers)?,
            serde_json::to_string(&card.partner_bonuses)?,
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(card_id = id, user_id = session.user_id, name = %card.name, "card added");
    Ok(id)
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Lists the session user's cards, newest first.
pub fn list_cards(conn: &Connection, session: &Session) -> StoreResult<Vec<Card>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, annual_fee, min_spend, min_spend_period,
                welcome_bonus, reward_rate, reward_multiplier, point_value,
                special_categories, bonus_tiers, partner_bonuses
         FROM cards
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![session.user_id], |row| {
        Ok(Card {
            id: Some(row.get(0)?),
            user_id: Some(row.get(1)?),
            name: row.get(2)?,
            annual_fee: row.get(3)?,
            min_spend: row.get(4)?,
            min_spend_period: row.get(5)?,
            welcome_bonus: row.get(6)?,
            reward_rate: row.get(7)?,
            reward_multiplier: row.get(8)?,
            point_value: row.get(9)?,
            special_categories: json_column(row, 10)?,
            bonus_tiers: json_column(row, 11)?,
            partner_bonuses: json_column(row, 12)?,
        })
    })?;

    let mut cards = Vec::new();
    for card in rows {
        cards.push(card?);
    }
    Ok(cards)
}

/// Deletes one of the session user's cards. Other users' cards are untouched.
pub fn remove_card(conn: &Connection, session: &Session, id: i64) -> StoreResult<bool> {
    let changed = conn.execute(
        "DELETE FROM cards WHERE id = ?1 AND user_id = ?2",
        params![id, session.user_id],
    )?;
    if changed > 0 {
        info!(card_id = id, user_id = session.user_id, "card removed");
    }
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BonusTier, PartnerBonus, SpecialCategory};

    /// Helper: creates an in-memory DB with tables ready to go.
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_tables(&conn).unwrap();
        conn
    }

    fn test_session(conn: &Connection, email: &str) -> Session {
        let user_id = insert_user(conn, email, "hash", "salt").unwrap();
        let token = format!("token-{email}");
        insert_session(conn, &token, user_id).unwrap();
        find_session(conn, &token).unwrap().unwrap()
    }

    fn sample_card(name: &str) -> Card {
        Card {
            annual_fee: 95.0,
            min_spend: 3000.0,
            welcome_bonus: 60000.0,
            reward_rate: 2.0,
            point_value: 0.0125,
            ..Card::new(name)
        }
    }

    #[test]
    fn test_add_card() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");

        let mut card = sample_card("Sapphire Preferred");
        card.special_categories.push(SpecialCategory {
            category: "dining".into(),
            reward_rate: 3.0,
            min_spend: None,
            max_spend: Some(1500.0),
        });
        card.bonus_tiers.push(BonusTier {
            min_spend: 0.0,
            max_spend: 1000.0,
            point_value: 0.1,
        });
        card.partner_bonuses.push(PartnerBonus {
            partner_name: "DoorDash".into(),
            bonus_rate: 2.0,
            description: "2x on DoorDash".into(),
        });
        let id = add_card(&conn, &session, &card).unwrap();
        assert_eq!(id, 1);

        let cards = list_cards(&conn, &session).unwrap();
        assert_eq!(cards.len(), 1);
        let stored = &cards[0];
        assert_eq!(stored.id, Some(1));
        assert_eq!(stored.user_id, Some(session.user_id));
        assert_eq!(stored.name, "Sapphire Preferred");
        assert_eq!(stored.annual_fee, 95.0);
        assert_eq!(stored.min_spend, 3000.0);
        assert_eq!(stored.min_spend_period, 90);
        assert_eq!(stored.special_categories, card.special_categories);
        assert_eq!(stored.bonus_tiers, card.bonus_tiers);
        assert_eq!(stored.partner_bonuses, card.partner_bonuses);
    }

    #[test]
    fn test_list_cards_empty() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");
        let cards = list_cards(&conn, &session).unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn test_list_cards_newest_first() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");

        add_card(&conn, &session, &sample_card("Card A")).unwrap();
        add_card(&conn, &session, &sample_card("Card B")).unwrap();
        add_card(&conn, &session, &sample_card("Card C")).unwrap();

        let cards = list_cards(&conn, &session).unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].name, "Card C");
        assert_eq!(cards[1].name, "Card B");
        assert_eq!(cards[2].name, "Card A");
    }

    #[test]
    fn test_cards_scoped_to_user() {
        let conn = test_db();
        let alice = test_session(&conn, "alice@example.com");
        let bob = test_session(&conn, "bob@example.com");

        let id = add_card(&conn, &alice, &sample_card("Alice Card")).unwrap();
        add_card(&conn, &bob, &sample_card("Bob Card")).unwrap();

        let alice_cards = list_cards(&conn, &alice).unwrap();
        assert_eq!(alice_cards.len(), 1);
        assert_eq!(alice_cards[0].name, "Alice Card");

        // Bob cannot delete Alice's card
        assert!(!remove_card(&conn, &bob, id).unwrap());
        assert_eq!(list_cards(&conn, &alice).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_card() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");

        let id = add_card(&conn, &session, &sample_card("Card A")).unwrap();
        assert!(remove_card(&conn, &session, id).unwrap());

        let cards = list_cards(&conn, &session).unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn test_remove_card_nonexistent() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");
        assert!(!remove_card(&conn, &session, 999).unwrap());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let conn = test_db();
        insert_user(&conn, "a@example.com", "hash", "salt").unwrap();
        let err = insert_user(&conn, "a@example.com", "hash2", "salt2").unwrap_err();
        assert!(matches!(err, StoreError::UserExists(email) if email == "a@example.com"));
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = test_db();
        let session = test_session(&conn, "a@example.com");
        assert_eq!(session.email, "a@example.com");

        let latest = latest_session(&conn).unwrap().unwrap();
        assert_eq!(latest.token, session.token);

        assert!(deactivate_session(&conn, &session.token).unwrap());
        assert!(find_session(&conn, &session.token).unwrap().is_none());
        assert!(latest_session(&conn).unwrap().is_none());
        assert!(!deactivate_session(&conn, &session.token).unwrap());
    }
}
