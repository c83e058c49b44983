//! SQLite persistence for users, friendships, posts and chats.
//!
//! All identifiers are UUID v4 strings and all timestamps are Unix
//! milliseconds. Enum columns hold the lowercase names from `sari_core::model`.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use sari_core::model::{
    AccountMode, FriendshipStatus, MessageKind, OnlineStatus, Relation, ThemeColors, Visibility,
};

/// A persisted user row. Contains secrets; never serialize directly.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: String,
    pub bio: String,
    pub account_mode: AccountMode,
    pub theme: ThemeColors,
    pub email_verified: bool,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<u64>,
    pub online_status: OnlineStatus,
    pub last_seen: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Fields a profile update may change. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub account_mode: Option<AccountMode>,
    pub profile_picture: Option<String>,
    pub theme: Option<ThemeColors>,
}

/// A persisted friendship record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendshipRecord {
    pub id: String,
    pub requester_id: String,
    pub recipient_id: String,
    pub status: FriendshipStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl FriendshipRecord {
    /// The side of the record that is not `user_id`.
    pub fn other(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.recipient_id
        } else {
            &self.requester_id
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub id: String,
    pub user_id: String,
    pub caption: String,
    pub image: String,
    pub visibility: Visibility,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A one-to-one chat. Participants are stored as an ordered pair
/// (`user_a < user_b`) so each pair maps to exactly one row.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub last_message_id: Option<String>,
    pub last_message_at: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ChatRecord {
    pub fn participants(&self) -> [&str; 2] {
        [&self.user_a, &self.user_b]
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other(&self, user_id: &str) -> &str {
        if self.user_a == user_id {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

/// A read receipt on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenReceipt {
    pub user_id: String,
    pub seen_at: u64,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub media_url: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub seen_by: Vec<SeenReceipt>,
}

impl MessageRecord {
    pub fn seen_by_user(&self, user_id: &str) -> bool {
        self.seen_by.iter().any(|s| s.user_id == user_id)
    }
}

/// Persistent storage backed by SQLite.
pub struct Storage {
    conn: Mutex<Connection>,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, profile_picture, bio, account_mode,
     theme_primary, theme_secondary, theme_tertiary, email_verified, otp_code, otp_expires_at,
     online_status, last_seen, created_at, updated_at";

const FRIENDSHIP_COLUMNS: &str = "id, requester_id, recipient_id, status, created_at, updated_at";

const POST_COLUMNS: &str = "id, user_id, caption, image, visibility, created_at, updated_at";

const CHAT_COLUMNS: &str =
    "id, user_a, user_b, last_message_id, last_message_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, content, kind, media_url, created_at, updated_at";

impl Storage {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read/write performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(&conn)?;

        info!("Database opened: {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id               TEXT PRIMARY KEY,
                name             TEXT NOT NULL,
                email            TEXT NOT NULL UNIQUE,
                password_hash    TEXT NOT NULL,
                profile_picture  TEXT NOT NULL DEFAULT '',
                bio              TEXT NOT NULL DEFAULT '',
                account_mode     TEXT NOT NULL DEFAULT 'public',
                theme_primary    TEXT NOT NULL DEFAULT '#6366f1',
                theme_secondary  TEXT NOT NULL DEFAULT '#8b5cf6',
                theme_tertiary   TEXT NOT NULL DEFAULT '#ec4899',
                email_verified   INTEGER NOT NULL DEFAULT 0,
                otp_code         TEXT,
                otp_expires_at   INTEGER,
                reset_token_hash TEXT,
                reset_expires_at INTEGER,
                online_status    TEXT NOT NULL DEFAULT 'offline',
                last_seen        INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                updated_at       INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_reset
                ON users(reset_token_hash);

            CREATE TABLE IF NOT EXISTS friendships (
                id           TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status       TEXT NOT NULL DEFAULT 'pending',
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                UNIQUE(requester_id, recipient_id)
            );

            CREATE INDEX IF NOT EXISTS idx_friendships_recipient
                ON friendships(recipient_id, status);

            CREATE TABLE IF NOT EXISTS posts (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                caption    TEXT NOT NULL DEFAULT '',
                image      TEXT NOT NULL DEFAULT '',
                visibility TEXT NOT NULL DEFAULT 'public',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_posts_user
                ON posts(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_posts_created
                ON posts(created_at);

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id    TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS post_comments (
                id         TEXT PRIMARY KEY,
                post_id    TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text       TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_post_comments_post
                ON post_comments(post_id, created_at);

            CREATE TABLE IF NOT EXISTS chats (
                id              TEXT PRIMARY KEY,
                user_a          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_b          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_message_id TEXT,
                last_message_at INTEGER NOT NULL,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                UNIQUE(user_a, user_b),
                CHECK (user_a < user_b)
            );

            CREATE INDEX IF NOT EXISTS idx_chats_user_a ON chats(user_a);
            CREATE INDEX IF NOT EXISTS idx_chats_user_b ON chats(user_b);
            CREATE INDEX IF NOT EXISTS idx_chats_last ON chats(last_message_at);

            CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                chat_id    TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content    TEXT NOT NULL DEFAULT '',
                kind       TEXT NOT NULL DEFAULT 'text',
                media_url  TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_chat
                ON messages(chat_id, created_at);

            CREATE TABLE IF NOT EXISTS message_seen (
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seen_at    INTEGER NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS uploads (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id    TEXT NOT NULL,
                folder      TEXT NOT NULL,
                filename    TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_uploads_owner
                ON uploads(owner_id, id);",
        )?;
        Ok(())
    }

    /// Lock the connection. A panic while holding the lock leaves SQLite
    /// itself consistent, so a poisoned mutex is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Users ──

    /// Create an unverified account, or refresh the existing unverified one
    /// for this email with a new name, password hash and OTP.
    /// Returns the user id, or `None` when a verified account owns the email.
    pub fn upsert_pending_signup(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        otp: &str,
        otp_expires_at: u64,
    ) -> Result<Option<String>, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now_millis() as i64;

        let existing: Option<(String, bool)> = tx
            .query_row(
                "SELECT id, email_verified FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let id = match existing {
            Some((_, true)) => return Ok(None),
            Some((id, false)) => {
                tx.execute(
                    "UPDATE users SET name = ?2, password_hash = ?3, otp_code = ?4,
                        otp_expires_at = ?5, updated_at = ?6
                     WHERE id = ?1",
                    params![id, name, password_hash, otp, otp_expires_at as i64, now],
                )?;
                id
            }
            None => {
                let id = new_id();
                tx.execute(
                    "INSERT INTO users (id, name, email, password_hash, otp_code, otp_expires_at,
                        last_seen, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
                    params![id, name, email, password_hash, otp, otp_expires_at as i64, now],
                )?;
                id
            }
        };
        tx.commit()?;
        Ok(Some(id))
    }

    /// Look up a user by id.
    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user_row,
        )
        .optional()
    }

    /// Look up a user by (already normalized) email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            map_user_row,
        )
        .optional()
    }

    /// Load several users at once, keyed by id. Unknown ids are skipped.
    pub fn users_by_ids(&self, ids: &[&str]) -> Result<HashMap<String, UserRecord>, rusqlite::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN ({placeholders})"
        ))?;
        let users = stmt
            .query_map(params_from_iter(ids.iter()), map_user_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    /// Mark the email as verified and clear the OTP.
    pub fn mark_verified(&self, id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET email_verified = 1, otp_code = NULL, otp_expires_at = NULL,
                updated_at = ?2
             WHERE id = ?1",
            params![id, now_millis() as i64],
        )?;
        Ok(())
    }

    /// Record presence and bump `last_seen`.
    pub fn set_online_status(&self, id: &str, status: OnlineStatus) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET online_status = ?2, last_seen = ?3 WHERE id = ?1",
            params![id, status.as_str(), now_millis() as i64],
        )?;
        Ok(())
    }

    /// Apply a partial profile update and return the updated row.
    pub fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<Option<UserRecord>, rusqlite::Error> {
        {
            let conn = self.conn();
            let theme = update.theme.as_ref();
            conn.execute(
                "UPDATE users SET
                    name            = COALESCE(?2, name),
                    bio             = COALESCE(?3, bio),
                    account_mode    = COALESCE(?4, account_mode),
                    profile_picture = COALESCE(?5, profile_picture),
                    theme_primary   = COALESCE(?6, theme_primary),
                    theme_secondary = COALESCE(?7, theme_secondary),
                    theme_tertiary  = COALESCE(?8, theme_tertiary),
                    updated_at      = ?9
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.bio,
                    update.account_mode.map(|m| m.as_str()),
                    update.profile_picture,
                    theme.map(|t| t.primary.as_str()),
                    theme.map(|t| t.secondary.as_str()),
                    theme.map(|t| t.tertiary.as_str()),
                    now_millis() as i64,
                ],
            )?;
        }
        self.get_user(id)
    }

    /// Replace the password hash. Any outstanding reset token is invalidated.
    pub fn set_password(&self, id: &str, password_hash: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET password_hash = ?2, reset_token_hash = NULL, reset_expires_at = NULL,
                updated_at = ?3
             WHERE id = ?1",
            params![id, password_hash, now_millis() as i64],
        )?;
        Ok(())
    }

    /// Store the hash of a password-reset token.
    pub fn set_reset_token(
        &self,
        id: &str,
        token_hash: &str,
        expires_at: u64,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET reset_token_hash = ?2, reset_expires_at = ?3 WHERE id = ?1",
            params![id, token_hash, expires_at as i64],
        )?;
        Ok(())
    }

    /// Find the user holding an unexpired reset token with this hash.
    pub fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<UserRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE reset_token_hash = ?1 AND reset_expires_at > ?2"
            ),
            params![token_hash, now as i64],
            map_user_row,
        )
        .optional()
    }

    /// Case-insensitive substring search over names and emails of verified
    /// users, excluding the viewer.
    pub fn search_users(
        &self,
        viewer_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<UserRecord>, rusqlite::Error> {
        let conn = self.conn();
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE (name LIKE ?2 ESCAPE '\\' OR email LIKE ?2 ESCAPE '\\')
               AND id != ?1 AND email_verified = 1
             ORDER BY name COLLATE NOCASE
             LIMIT ?3"
        ))?;
        let users = stmt
            .query_map(params![viewer_id, pattern, limit as i64], map_user_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Verified public accounts other than the viewer.
    pub fn public_users(&self, viewer_id: &str, limit: usize) -> Result<Vec<UserRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE account_mode = 'public' AND email_verified = 1 AND id != ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;
        let users = stmt
            .query_map(params![viewer_id, limit as i64], map_user_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // ── Friendships ──

    /// Find the record linking two users, in either direction.
    pub fn find_friendship_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<FriendshipRecord>, rusqlite::Error> {
        let conn = self.conn();
        find_friendship_between(&conn, a, b)
    }

    /// Create a pending request from `requester` to `recipient`.
    /// Returns `None` if any record already links the pair.
    pub fn create_friend_request(
        &self,
        requester: &str,
        recipient: &str,
    ) -> Result<Option<FriendshipRecord>, rusqlite::Error> {
        let conn = self.conn();
        if find_friendship_between(&conn, requester, recipient)?.is_some() {
            return Ok(None);
        }
        let id = new_id();
        let now = now_millis() as i64;
        conn.execute(
            "INSERT INTO friendships (id, requester_id, recipient_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
            params![id, requester, recipient, now],
        )?;
        conn.query_row(
            &format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = ?1"),
            params![id],
            map_friendship_row,
        )
        .optional()
    }

    pub fn get_friendship(&self, id: &str) -> Result<Option<FriendshipRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = ?1"),
            params![id],
            map_friendship_row,
        )
        .optional()
    }

    /// Change a record's status and return the updated record.
    pub fn set_friendship_status(
        &self,
        id: &str,
        status: FriendshipStatus,
    ) -> Result<Option<FriendshipRecord>, rusqlite::Error> {
        {
            let conn = self.conn();
            conn.execute(
                "UPDATE friendships SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now_millis() as i64],
            )?;
        }
        self.get_friendship(id)
    }

    /// Delete a record. Returns whether anything was removed.
    pub fn delete_friendship(&self, id: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM friendships WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Pending requests sent by the user.
    pub fn pending_sent(&self, user_id: &str) -> Result<Vec<FriendshipRecord>, rusqlite::Error> {
        self.query_friendships(
            "WHERE requester_id = ?1 AND status = 'pending' ORDER BY created_at DESC",
            user_id,
        )
    }

    /// Pending requests addressed to the user.
    pub fn pending_received(&self, user_id: &str) -> Result<Vec<FriendshipRecord>, rusqlite::Error> {
        self.query_friendships(
            "WHERE recipient_id = ?1 AND status = 'pending' ORDER BY created_at DESC",
            user_id,
        )
    }

    /// Accepted records on either side of the user.
    pub fn accepted_friendships(&self, user_id: &str) -> Result<Vec<FriendshipRecord>, rusqlite::Error> {
        self.query_friendships(
            "WHERE (requester_id = ?1 OR recipient_id = ?1) AND status = 'accepted'
             ORDER BY updated_at DESC",
            user_id,
        )
    }

    fn query_friendships(
        &self,
        clause: &str,
        user_id: &str,
    ) -> Result<Vec<FriendshipRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships {clause}"
        ))?;
        let records = stmt
            .query_map(params![user_id], map_friendship_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Whether the two users have an accepted friendship.
    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool, rusqlite::Error> {
        Ok(self
            .find_friendship_between(a, b)?
            .is_some_and(|f| f.status == FriendshipStatus::Accepted))
    }

    /// The viewer's relation to each of `ids`. Ids with no record map to
    /// `Relation::None`; the viewer's own id does too.
    pub fn relations_for(
        &self,
        viewer_id: &str,
        ids: &[&str],
    ) -> Result<HashMap<String, Relation>, rusqlite::Error> {
        let mut relations: HashMap<String, Relation> =
            ids.iter().map(|id| (id.to_string(), Relation::None)).collect();
        if ids.is_empty() {
            return Ok(relations);
        }

        let conn = self.conn();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
             WHERE (requester_id = ?1 AND recipient_id IN ({placeholders}))
                OR (recipient_id = ?1 AND requester_id IN ({placeholders}))"
        ))?;
        let mut bind: Vec<&str> = Vec::with_capacity(ids.len() * 2 + 1);
        bind.push(viewer_id);
        bind.extend_from_slice(ids);
        bind.extend_from_slice(ids);
        let records = stmt
            .query_map(params_from_iter(bind.iter()), map_friendship_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for record in records {
            let requester_is_viewer = record.requester_id == viewer_id;
            let other = record.other(viewer_id).to_string();
            relations.insert(other, Relation::from_record(record.status, requester_is_viewer));
        }
        Ok(relations)
    }

    // ── Posts ──

    pub fn create_post(
        &self,
        user_id: &str,
        caption: &str,
        image: &str,
        visibility: Visibility,
    ) -> Result<PostRecord, rusqlite::Error> {
        let conn = self.conn();
        let id = new_id();
        let now = now_millis() as i64;
        conn.execute(
            "INSERT INTO posts (id, user_id, caption, image, visibility, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, user_id, caption, image, visibility.as_str(), now],
        )?;
        conn.query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            params![id],
            map_post_row,
        )
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            params![id],
            map_post_row,
        )
        .optional()
    }

    /// The viewer's feed, newest first: every public post, friends-only
    /// posts by accepted friends, and all of the viewer's own posts.
    pub fn feed_posts(&self, viewer_id: &str, limit: usize) -> Result<Vec<PostRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE visibility = 'public'
                OR user_id = ?1
                OR (visibility = 'friends' AND user_id IN (
                    SELECT CASE WHEN requester_id = ?1 THEN recipient_id ELSE requester_id END
                    FROM friendships
                    WHERE status = 'accepted' AND (requester_id = ?1 OR recipient_id = ?1)
                ))
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))?;
        let posts = stmt
            .query_map(params![viewer_id, limit as i64], map_post_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    /// Posts by one author, newest first. Friends-only posts are included
    /// only when `include_friends_only` is set.
    pub fn posts_by_user(
        &self,
        author_id: &str,
        include_friends_only: bool,
    ) -> Result<Vec<PostRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE user_id = ?1 AND (?2 OR visibility = 'public')
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let posts = stmt
            .query_map(params![author_id, include_friends_only], map_post_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    /// Like the post, or unlike it if already liked. Returns the new state.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
        )?;
        if removed > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, now_millis() as i64],
        )?;
        Ok(true)
    }

    /// User ids that liked the post, in the order they liked it.
    pub fn post_likes(&self, post_id: &str) -> Result<Vec<String>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM post_likes WHERE post_id = ?1 ORDER BY created_at, rowid",
        )?;
        let likes = stmt
            .query_map(params![post_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(likes)
    }

    pub fn add_comment(
        &self,
        post_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<CommentRecord, rusqlite::Error> {
        let conn = self.conn();
        let id = new_id();
        let now = now_millis();
        conn.execute(
            "INSERT INTO post_comments (id, post_id, user_id, text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, post_id, user_id, text, now as i64],
        )?;
        Ok(CommentRecord {
            id,
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Comments on a post, oldest first.
    pub fn post_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, post_id, user_id, text, created_at, updated_at FROM post_comments
             WHERE post_id = ?1 ORDER BY created_at, rowid",
        )?;
        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(CommentRecord {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    user_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get::<_, i64>(4)? as u64,
                    updated_at: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    // ── Chats ──

    /// Return the chat between two users, creating it if needed.
    /// The bool is true when a new chat was created.
    pub fn get_or_create_chat(&self, a: &str, b: &str) -> Result<(ChatRecord, bool), rusqlite::Error> {
        let (user_a, user_b) = if a < b { (a, b) } else { (b, a) };
        let conn = self.conn();
        let existing = conn
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE user_a = ?1 AND user_b = ?2"),
                params![user_a, user_b],
                map_chat_row,
            )
            .optional()?;
        if let Some(chat) = existing {
            return Ok((chat, false));
        }

        let id = new_id();
        let now = now_millis() as i64;
        conn.execute(
            "INSERT INTO chats (id, user_a, user_b, last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
            params![id, user_a, user_b, now],
        )?;
        let chat = conn.query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
            params![id],
            map_chat_row,
        )?;
        Ok((chat, true))
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRecord>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
            params![id],
            map_chat_row,
        )
        .optional()
    }

    /// Chats the user takes part in, most recently active first.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE user_a = ?1 OR user_b = ?1
             ORDER BY last_message_at DESC, rowid DESC"
        ))?;
        let chats = stmt
            .query_map(params![user_id], map_chat_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    /// All messages of a chat, oldest first, with their seen receipts.
    pub fn chat_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let mut messages = stmt
            .query_map(params![chat_id], map_message_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut receipts: HashMap<String, Vec<SeenReceipt>> = HashMap::new();
        let mut seen_stmt = conn.prepare(
            "SELECT s.message_id, s.user_id, s.seen_at
             FROM message_seen s JOIN messages m ON m.id = s.message_id
             WHERE m.chat_id = ?1
             ORDER BY s.seen_at, s.rowid",
        )?;
        let rows = seen_stmt.query_map(params![chat_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                SeenReceipt {
                    user_id: row.get(1)?,
                    seen_at: row.get::<_, i64>(2)? as u64,
                },
            ))
        })?;
        for row in rows {
            let (message_id, receipt) = row?;
            receipts.entry(message_id).or_default().push(receipt);
        }
        for message in &mut messages {
            if let Some(seen) = receipts.remove(&message.id) {
                message.seen_by = seen;
            }
        }
        Ok(messages)
    }

    /// Load one message of a chat, with receipts.
    pub fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>, rusqlite::Error> {
        let conn = self.conn();
        load_message(&conn, chat_id, message_id)
    }

    /// The chat's newest message, if any.
    pub fn last_message(&self, chat: &ChatRecord) -> Result<Option<MessageRecord>, rusqlite::Error> {
        match chat.last_message_id.as_deref() {
            Some(message_id) => self.get_message(&chat.id, message_id),
            None => Ok(None),
        }
    }

    /// Append a message and move the chat's last-message pointer in one
    /// transaction.
    pub fn append_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
        media_url: &str,
    ) -> Result<MessageRecord, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = new_id();

        // Clamp so last_message_at never moves backwards on a clock step.
        let previous: i64 = tx.query_row(
            "SELECT last_message_at FROM chats WHERE id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;
        let now = (now_millis() as i64).max(previous);

        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, kind, media_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![id, chat_id, sender_id, content, kind.as_str(), media_url, now],
        )?;
        tx.execute(
            "UPDATE chats SET last_message_id = ?2, last_message_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![chat_id, id, now],
        )?;
        tx.commit()?;

        Ok(MessageRecord {
            id,
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind,
            media_url: media_url.to_string(),
            created_at: now as u64,
            updated_at: now as u64,
            seen_by: Vec::new(),
        })
    }

    /// Record that `user_id` has seen the message. Idempotent; returns
    /// whether a new receipt was written.
    pub fn mark_seen(&self, message_id: &str, user_id: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let rows = conn.execute(
            "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at) VALUES (?1, ?2, ?3)",
            params![message_id, user_id, now_millis() as i64],
        )?;
        Ok(rows > 0)
    }

    // ── Uploads ──

    /// Record a stored media file and return its row id.
    pub fn record_upload(&self, owner_id: &str, folder: &str, filename: &str) -> Result<i64, rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO uploads (owner_id, folder, filename, uploaded_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, folder, filename, now_millis() as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Number of uploads recorded for a user.
    pub fn upload_count(&self, owner_id: &str) -> Result<i64, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM uploads WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )
    }
}

fn find_friendship_between(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<FriendshipRecord>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
             WHERE (requester_id = ?1 AND recipient_id = ?2)
                OR (requester_id = ?2 AND recipient_id = ?1)
             LIMIT 1"
        ),
        params![a, b],
        map_friendship_row,
    )
    .optional()
}

fn load_message(
    conn: &Connection,
    chat_id: &str,
    message_id: &str,
) -> Result<Option<MessageRecord>, rusqlite::Error> {
    let message = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_id = ?2"),
            params![message_id, chat_id],
            map_message_row,
        )
        .optional()?;
    let Some(mut message) = message else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT user_id, seen_at FROM message_seen WHERE message_id = ?1 ORDER BY seen_at, rowid",
    )?;
    message.seen_by = stmt
        .query_map(params![message_id], |row| {
            Ok(SeenReceipt {
                user_id: row.get(0)?,
                seen_at: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(message))
}

/// Parse a lowercase enum column.
fn enum_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = sari_core::error::Error>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_user_row(row: &Row) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        profile_picture: row.get(4)?,
        bio: row.get(5)?,
        account_mode: enum_col(row, 6)?,
        theme: ThemeColors {
            primary: row.get(7)?,
            secondary: row.get(8)?,
            tertiary: row.get(9)?,
        },
        email_verified: row.get(10)?,
        otp_code: row.get(11)?,
        otp_expires_at: row.get::<_, Option<i64>>(12)?.map(|t| t as u64),
        online_status: enum_col(row, 13)?,
        last_seen: row.get::<_, i64>(14)? as u64,
        created_at: row.get::<_, i64>(15)? as u64,
        updated_at: row.get::<_, i64>(16)? as u64,
    })
}

fn map_friendship_row(row: &Row) -> rusqlite::Result<FriendshipRecord> {
    Ok(FriendshipRecord {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        recipient_id: row.get(2)?,
        status: enum_col(row, 3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        updated_at: row.get::<_, i64>(5)? as u64,
    })
}

fn map_post_row(row: &Row) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        caption: row.get(2)?,
        image: row.get(3)?,
        visibility: enum_col(row, 4)?,
        created_at: row.get::<_, i64>(5)? as u64,
        updated_at: row.get::<_, i64>(6)? as u64,
    })
}

fn map_chat_row(row: &Row) -> rusqlite::Result<ChatRecord> {
    Ok(ChatRecord {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        last_message_id: row.get(3)?,
        last_message_at: row.get::<_, i64>(4)? as u64,
        created_at: row.get::<_, i64>(5)? as u64,
        updated_at: row.get::<_, i64>(6)? as u64,
    })
}

fn map_message_row(row: &Row) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        kind: enum_col(row, 4)?,
        media_url: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
        updated_at: row.get::<_, i64>(7)? as u64,
        seen_by: Vec::new(),
    })
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified_user(db: &Storage, name: &str, email: &str) -> String {
        let id = db
            .upsert_pending_signup(name, email, "hash", "123456", now_millis() + 60_000)
            .unwrap()
            .unwrap();
        db.mark_verified(&id).unwrap();
        id
    }

    #[test]
    fn signup_refreshes_unverified_row() {
        let db = Storage::open_in_memory().unwrap();
        let first = db
            .upsert_pending_signup("Ann", "ann@example.com", "h1", "111111", 10)
            .unwrap()
            .unwrap();
        let second = db
            .upsert_pending_signup("Annie", "ann@example.com", "h2", "222222", 20)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        let user = db.get_user(&first).unwrap().unwrap();
        assert_eq!(user.name, "Annie");
        assert_eq!(user.password_hash, "h2");
        assert_eq!(user.otp_code.as_deref(), Some("222222"));
        assert_eq!(user.otp_expires_at, Some(20));
        assert!(!user.email_verified);
    }

    #[test]
    fn signup_refused_for_verified_email() {
        let db = Storage::open_in_memory().unwrap();
        verified_user(&db, "Ann", "ann@example.com");
        let again = db
            .upsert_pending_signup("Ann", "ann@example.com", "h", "333333", 10)
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn verification_clears_otp() {
        let db = Storage::open_in_memory().unwrap();
        let id = verified_user(&db, "Ann", "ann@example.com");
        let user = db.get_user(&id).unwrap().unwrap();
        assert!(user.email_verified);
        assert!(user.otp_code.is_none());
        assert!(user.otp_expires_at.is_none());
    }

    #[test]
    fn search_skips_self_and_unverified() {
        let db = Storage::open_in_memory().unwrap();
        let ann = verified_user(&db, "Ann", "ann@example.com");
        let anna = verified_user(&db, "Anna", "anna@example.com");
        db.upsert_pending_signup("Annabel", "annabel@example.com", "h", "1", 1)
            .unwrap();

        let hits = db.search_users(&ann, "ANN", 20).unwrap();
        let ids: Vec<_> = hits.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec![anna.as_str()]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let db = Storage::open_in_memory().unwrap();
        let ann = verified_user(&db, "Ann", "ann@example.com");
        verified_user(&db, "Bob", "bob@example.com");
        assert!(db.search_users(&ann, "%", 20).unwrap().is_empty());
    }

    #[test]
    fn profile_update_is_partial() {
        let db = Storage::open_in_memory().unwrap();
        let id = verified_user(&db, "Ann", "ann@example.com");
        let update = ProfileUpdate {
            bio: Some("hello".into()),
            account_mode: Some(AccountMode::Private),
            ..Default::default()
        };
        let user = db.update_profile(&id, &update).unwrap().unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.bio, "hello");
        assert_eq!(user.account_mode, AccountMode::Private);
        assert_eq!(user.theme, ThemeColors::default());
    }

    #[test]
    fn reset_token_lookup_respects_expiry() {
        let db = Storage::open_in_memory().unwrap();
        let id = verified_user(&db, "Ann", "ann@example.com");
        db.set_reset_token(&id, "abc", 1_000).unwrap();
        assert!(db.find_by_reset_token("abc", 999).unwrap().is_some());
        assert!(db.find_by_reset_token("abc", 1_000).unwrap().is_none());

        db.set_password(&id, "new-hash").unwrap();
        assert!(db.find_by_reset_token("abc", 0).unwrap().is_none());
    }

    #[test]
    fn one_friendship_per_pair() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");

        let request = db.create_friend_request(&a, &b).unwrap().unwrap();
        assert_eq!(request.status, FriendshipStatus::Pending);
        assert!(db.create_friend_request(&a, &b).unwrap().is_none());
        assert!(db.create_friend_request(&b, &a).unwrap().is_none());

        assert!(db.delete_friendship(&request.id).unwrap());
        assert!(db.create_friend_request(&b, &a).unwrap().is_some());
    }

    #[test]
    fn relations_are_viewer_relative() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");
        let c = verified_user(&db, "C", "c@example.com");
        let d = verified_user(&db, "D", "d@example.com");

        db.create_friend_request(&a, &b).unwrap();
        let from_c = db.create_friend_request(&c, &a).unwrap().unwrap();
        let to_d = db.create_friend_request(&a, &d).unwrap().unwrap();
        db.set_friendship_status(&to_d.id, FriendshipStatus::Accepted).unwrap();

        let rel = db.relations_for(&a, &[&b, &c, &d, &a]).unwrap();
        assert_eq!(rel[&b], Relation::Sent);
        assert_eq!(rel[&c], Relation::Received);
        assert_eq!(rel[&d], Relation::Friends);
        assert_eq!(rel[&a], Relation::None);

        let rel_c = db.relations_for(&c, &[&a]).unwrap();
        assert_eq!(rel_c[&a], Relation::Sent);
        assert_eq!(db.pending_received(&a).unwrap(), vec![from_c]);
        assert!(db.are_friends(&d, &a).unwrap());
    }

    #[test]
    fn feed_respects_visibility() {
        let db = Storage::open_in_memory().unwrap();
        let me = verified_user(&db, "Me", "me@example.com");
        let friend = verified_user(&db, "Friend", "friend@example.com");
        let stranger = verified_user(&db, "Stranger", "stranger@example.com");

        let f = db.create_friend_request(&me, &friend).unwrap().unwrap();
        db.set_friendship_status(&f.id, FriendshipStatus::Accepted).unwrap();

        let mine = db.create_post(&me, "mine", "", Visibility::Friends).unwrap();
        let friend_only = db.create_post(&friend, "friend", "", Visibility::Friends).unwrap();
        let public = db.create_post(&stranger, "public", "", Visibility::Public).unwrap();
        db.create_post(&stranger, "hidden", "", Visibility::Friends).unwrap();

        let feed = db.feed_posts(&me, 50).unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![public.id, friend_only.id, mine.id]);
    }

    #[test]
    fn posts_by_user_hides_friends_only_when_asked() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        db.create_post(&a, "one", "", Visibility::Public).unwrap();
        db.create_post(&a, "two", "", Visibility::Friends).unwrap();
        assert_eq!(db.posts_by_user(&a, true).unwrap().len(), 2);
        let public = db.posts_by_user(&a, false).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].caption, "one");
    }

    #[test]
    fn like_toggles() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let post = db.create_post(&a, "", "", Visibility::Public).unwrap();
        assert!(db.toggle_like(&post.id, &a).unwrap());
        assert_eq!(db.post_likes(&post.id).unwrap(), vec![a.clone()]);
        assert!(!db.toggle_like(&post.id, &a).unwrap());
        assert!(db.post_likes(&post.id).unwrap().is_empty());
    }

    #[test]
    fn comments_in_order() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let post = db.create_post(&a, "", "", Visibility::Public).unwrap();
        db.add_comment(&post.id, &a, "first").unwrap();
        db.add_comment(&post.id, &a, "second").unwrap();
        let texts: Vec<_> = db
            .post_comments(&post.id)
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn one_chat_per_pair_in_either_order() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");
        let (chat, created) = db.get_or_create_chat(&a, &b).unwrap();
        assert!(created);
        let (again, created) = db.get_or_create_chat(&b, &a).unwrap();
        assert!(!created);
        assert_eq!(chat.id, again.id);
        assert!(chat.has_participant(&a) && chat.has_participant(&b));
        assert_eq!(chat.other(&a), b);
    }

    #[test]
    fn append_moves_last_message_pointer() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");
        let (chat, _) = db.get_or_create_chat(&a, &b).unwrap();

        db.append_message(&chat.id, &a, "hi", MessageKind::Text, "").unwrap();
        let second = db.append_message(&chat.id, &b, "yo", MessageKind::Emoji, "").unwrap();

        let chat = db.get_chat(&chat.id).unwrap().unwrap();
        assert_eq!(chat.last_message_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(chat.last_message_at, second.created_at);

        let last = db.last_message(&chat).unwrap().unwrap();
        assert_eq!(last.content, "yo");
        assert_eq!(last.kind, MessageKind::Emoji);

        let all = db.chat_messages(&chat.id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hi");
    }

    #[test]
    fn seen_receipt_recorded_once() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");
        let (chat, _) = db.get_or_create_chat(&a, &b).unwrap();
        let msg = db.append_message(&chat.id, &a, "hi", MessageKind::Text, "").unwrap();

        assert!(db.mark_seen(&msg.id, &b).unwrap());
        assert!(!db.mark_seen(&msg.id, &b).unwrap());

        let loaded = db.get_message(&chat.id, &msg.id).unwrap().unwrap();
        assert_eq!(loaded.seen_by.len(), 1);
        assert!(loaded.seen_by_user(&b));
        assert!(!loaded.seen_by_user(&a));

        let listed = db.chat_messages(&chat.id).unwrap();
        assert!(listed[0].seen_by_user(&b));
    }

    #[test]
    fn message_lookup_is_scoped_to_chat() {
        let db = Storage::open_in_memory().unwrap();
        let a = verified_user(&db, "A", "a@example.com");
        let b = verified_user(&db, "B", "b@example.com");
        let c = verified_user(&db, "C", "c@example.com");
        let (ab, _) = db.get_or_create_chat(&a, &b).unwrap();
        let (ac, _) = db.get_or_create_chat(&a, &c).unwrap();
        let msg = db.append_message(&ab.id, &a, "hi", MessageKind::Text, "").unwrap();
        assert!(db.get_message(&ac.id, &msg.id).unwrap().is_none());
    }

    #[test]
    fn uploads_are_counted() {
        let db = Storage::open_in_memory().unwrap();
        db.record_upload("u1", "posts", "a.png").unwrap();
        db.record_upload("u1", "chat", "b.mp3").unwrap();
        assert_eq!(db.upload_count("u1").unwrap(), 2);
        assert_eq!(db.upload_count("u2").unwrap(), 0);
    }
}
