//! SQLite storage layer for PCCOE Connect.
//!
//! Owns the relational state for the whole application: profiles, the
//! connection graph, conversations and their participants, group membership,
//! messages, notifications, and the social feed. Handles schema creation and
//! CRUD operations for all entity types, plus the multi-step coordination
//! operations (direct-conversation and group creation) that run as explicit
//! compensation sagas rather than transactions.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Serde(serde_json::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Profile row stored in the database. Created at signup, mutated by the
/// owning user, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// "student" or "admin"
    pub role: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub department: Option<String>,
    pub prn: Option<String>,
    pub branch: Option<String>,
    pub year: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Directional connection edge. The relationship is conceptually symmetric;
/// sender/receiver record who initiated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    /// "pending", "accepted", "rejected"
    pub status: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Conversation row. Direct conversations have exactly two participants and
/// no group metadata; group conversations carry name/description and an
/// arbitrary member set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub conversation_id: String,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub group_avatar_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: u64,
    /// Bumped on every new message to support recency ordering.
    pub updated_at: u64,
}

/// Membership row shared by direct and group conversations, so message and
/// unread-count queries stay uniform across both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub conversation_id: String,
    pub profile_id: String,
    pub joined_at: u64,
}

/// Role-tagged group membership row. Exactly one "lead" per group, assigned
/// at creation to the creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberRow {
    pub conversation_id: String,
    pub profile_id: String,
    /// "lead", "admin", "member"
    pub role: String,
    pub joined_at: u64,
    pub added_by: Option<String>,
}

/// Outcome of a leave-group attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    NotMember,
    LeadRefused,
}

/// Message row. Immutable once created except for `read_at`, which
/// transitions once from NULL when a non-sender views it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: u64,
    pub read_at: Option<u64>,
}

/// Stored notification row. Connection-request notifications are never
/// stored; they are synthesized at read time from pending connection rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub content: String,
    /// e.g. "connection_accepted", "announcement"
    pub category: String,
    pub sender_id: Option<String>,
    pub created_at: u64,
}

/// One entry of the merged notification feed: either a stored row
/// (`id = Some`) or a synthesized connection-request entry (`id = None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFeedItem {
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    pub category: String,
    pub sender_id: Option<String>,
    /// For synthesized connection-request entries this carries the sender's
    /// user identifier, which accept/reject callers pass back as the
    /// requester key. It is not a connections row id.
    pub connection_id: Option<String>,
    pub created_at: u64,
}

/// Feed post row. A post is text plus an optional media URL and an optional
/// attached poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRow {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub poll_id: Option<String>,
    pub created_at: u64,
}

/// Comment row on a feed post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    pub comment_id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: u64,
}

/// Poll row. Options are stored as a JSON array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRow {
    pub poll_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                user_id      TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_url   TEXT,
                role         TEXT NOT NULL DEFAULT 'student',
                phone        TEXT,
                bio          TEXT,
                department   TEXT,
                prn          TEXT,
                branch       TEXT,
                year         TEXT,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS connections (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id   TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_connections_receiver
                ON connections(receiver_id, status);
            CREATE INDEX IF NOT EXISTS idx_connections_sender
                ON connections(sender_id, status);

            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id   TEXT PRIMARY KEY,
                is_group          INTEGER NOT NULL DEFAULT 0,
                group_name        TEXT,
                group_description TEXT,
                group_avatar_url  TEXT,
                created_by        TEXT,
                created_at        INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversation_participants (
                conversation_id TEXT NOT NULL,
                profile_id      TEXT NOT NULL,
                joined_at       INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, profile_id)
            );

            CREATE INDEX IF NOT EXISTS idx_participants_profile
                ON conversation_participants(profile_id);

            CREATE TABLE IF NOT EXISTS group_members (
                conversation_id TEXT NOT NULL,
                profile_id      TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'member',
                joined_at       INTEGER NOT NULL,
                added_by        TEXT,
                PRIMARY KEY (conversation_id, profile_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                message_id      TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                read_at         INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_unread
                ON messages(conversation_id, read_at);

            CREATE TABLE IF NOT EXISTS notifications (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    TEXT NOT NULL,
                title      TEXT NOT NULL,
                content    TEXT NOT NULL,
                category   TEXT NOT NULL,
                sender_id  TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_user
                ON notifications(user_id, created_at);

            CREATE TABLE IF NOT EXISTS social_posts (
                post_id    TEXT PRIMARY KEY,
                author_id  TEXT NOT NULL,
                content    TEXT NOT NULL,
                media_url  TEXT,
                poll_id    TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_posts_created
                ON social_posts(created_at);

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id    TEXT NOT NULL,
                profile_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (post_id, profile_id)
            );

            CREATE TABLE IF NOT EXISTS post_comments (
                comment_id TEXT PRIMARY KEY,
                post_id    TEXT NOT NULL,
                author_id  TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_post
                ON post_comments(post_id, created_at);

            CREATE TABLE IF NOT EXISTS polls (
                poll_id    TEXT PRIMARY KEY,
                question   TEXT NOT NULL,
                options    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS poll_votes (
                poll_id      TEXT NOT NULL,
                voter_id     TEXT NOT NULL,
                option_index INTEGER NOT NULL,
                created_at   INTEGER NOT NULL,
                PRIMARY KEY (poll_id, voter_id)
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Profiles CRUD
    // -----------------------------------------------------------------------

    /// Insert a new profile. Returns `AlreadyExists` if the user id is taken.
    pub fn insert_profile(&self, row: &ProfileRow) -> Result<(), StorageError> {
        let result = self.conn.execute(
            "INSERT INTO profiles
             (user_id, display_name, avatar_url, role, phone, bio,
              department, prn, branch, year, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.user_id,
                row.display_name,
                row.avatar_url,
                row.role,
                row.phone,
                row.bio,
                row.department,
                row.prn,
                row.branch,
                row.year,
                row.created_at as i64,
                row.updated_at as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::AlreadyExists(format!(
                "profile {}",
                row.user_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, display_name, avatar_url, role, phone, bio,
                    department, prn, branch, year, created_at, updated_at
             FROM profiles WHERE user_id = ?1",
        )?;
        let row = stmt
            .query_row(params![user_id], |row| {
                Ok(ProfileRow {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    role: row.get(3)?,
                    phone: row.get(4)?,
                    bio: row.get(5)?,
                    department: row.get(6)?,
                    prn: row.get(7)?,
                    branch: row.get(8)?,
                    year: row.get(9)?,
                    created_at: row.get::<_, i64>(10)? as u64,
                    updated_at: row.get::<_, i64>(11)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Update every owner-mutable field of a profile. Returns false if the
    /// profile does not exist.
    pub fn update_profile(&self, row: &ProfileRow) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE profiles SET display_name = ?2, avatar_url = ?3, phone = ?4,
                    bio = ?5, department = ?6, prn = ?7, branch = ?8, year = ?9,
                    updated_at = ?10
             WHERE user_id = ?1",
            params![
                row.user_id,
                row.display_name,
                row.avatar_url,
                row.phone,
                row.bio,
                row.department,
                row.prn,
                row.branch,
                row.year,
                row.updated_at as i64,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Search profiles by display name, restricted to the caller's accepted
    /// connections. A user cannot discover someone they have no accepted
    /// connection with through this path.
    pub fn search_connected_profiles(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<Vec<ProfileRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.user_id, p.display_name, p.avatar_url, p.role, p.phone, p.bio,
                    p.department, p.prn, p.branch, p.year, p.created_at, p.updated_at
             FROM profiles p
             WHERE p.user_id != ?1
               AND EXISTS (SELECT 1 FROM connections cn
                           WHERE cn.status = 'accepted'
                             AND ((cn.sender_id = ?1 AND cn.receiver_id = p.user_id)
                               OR (cn.sender_id = p.user_id AND cn.receiver_id = ?1)))
               AND p.display_name LIKE '%' || ?2 || '%'
             ORDER BY p.display_name",
        )?;
        let rows = stmt.query_map(params![user_id, query], |row| {
            Ok(ProfileRow {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                avatar_url: row.get(2)?,
                role: row.get(3)?,
                phone: row.get(4)?,
                bio: row.get(5)?,
                department: row.get(6)?,
                prn: row.get(7)?,
                branch: row.get(8)?,
                year: row.get(9)?,
                created_at: row.get::<_, i64>(10)? as u64,
                updated_at: row.get::<_, i64>(11)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Connection graph
    // -----------------------------------------------------------------------

    /// Insert a pending edge requester -> recipient. Deliberately performs no
    /// duplicate or reverse-edge pre-check; two clients sending requests to
    /// each other concurrently can both land a row (accepted current
    /// behavior, see the duplicate-race test).
    pub fn insert_connection(
        &self,
        sender_id: &str,
        receiver_id: &str,
        now: u64,
    ) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO connections (sender_id, receiver_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![sender_id, receiver_id, now as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Flip the pending edge requester -> accepter to accepted. Keyed by the
    /// (sender, receiver) pair, not a row id. Returns false if no matching
    /// pending edge exists.
    pub fn accept_connection(
        &self,
        requester_id: &str,
        accepter_id: &str,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE connections SET status = 'accepted', updated_at = ?3
             WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending'",
            params![requester_id, accepter_id, now as i64],
        )?;
        Ok(affected > 0)
    }

    /// Delete the pending edge exactly matching sender -> receiver. Serves
    /// both the sender's cancel and the receiver's reject.
    pub fn delete_pending_connection(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM connections
             WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending'",
            params![sender_id, receiver_id],
        )?;
        Ok(affected > 0)
    }

    /// Delete the accepted edge between two users in whichever direction it
    /// is stored: a -> b first, then b -> a. The edge is directional in
    /// storage but the relationship is symmetric, so both directions must be
    /// tried. Returns false only if neither deletion affected a row.
    pub fn remove_connection(&self, user_a: &str, user_b: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM connections
             WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'accepted'",
            params![user_a, user_b],
        )?;
        if affected > 0 {
            return Ok(true);
        }
        let affected = self.conn.execute(
            "DELETE FROM connections
             WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'accepted'",
            params![user_b, user_a],
        )?;
        Ok(affected > 0)
    }

    /// Canonicalized unordered-pair lookup: the active (pending or accepted)
    /// edge between two users in whichever direction it exists. All read
    /// paths go through this so direction never leaks into callers.
    pub fn connection_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ConnectionRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at
             FROM connections
             WHERE status IN ('pending', 'accepted')
               AND ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
             ORDER BY created_at LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![user_a, user_b], |row| {
                Ok(ConnectionRow {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    status: row.get(3)?,
                    created_at: row.get::<_, i64>(4)? as u64,
                    updated_at: row.get::<_, i64>(5)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Accepted connections of a user, either direction, newest first.
    pub fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at
             FROM connections
             WHERE status = 'accepted' AND (sender_id = ?1 OR receiver_id = ?1)
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConnectionRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Pending requests addressed to a user, newest first. Feeds the
    /// synthesized connection-request notifications.
    pub fn list_pending_requests_to(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConnectionRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at
             FROM connections
             WHERE status = 'pending' AND receiver_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConnectionRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Pending requests a user has sent, newest first.
    pub fn list_pending_requests_from(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConnectionRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, receiver_id, status, created_at, updated_at
             FROM connections
             WHERE status = 'pending' AND sender_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConnectionRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub fn insert_conversation(&self, row: &ConversationRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO conversations
             (conversation_id, is_group, group_name, group_description,
              group_avatar_url, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.conversation_id,
                row.is_group as i32,
                row.group_name,
                row.group_description,
                row.group_avatar_url,
                row.created_by,
                row.created_at as i64,
                row.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, is_group, group_name, group_description,
                    group_avatar_url, created_by, created_at, updated_at
             FROM conversations WHERE conversation_id = ?1",
        )?;
        let row = stmt
            .query_row(params![conversation_id], |row| {
                Ok(ConversationRow {
                    conversation_id: row.get(0)?,
                    is_group: row.get::<_, i32>(1)? != 0,
                    group_name: row.get(2)?,
                    group_description: row.get(3)?,
                    group_avatar_url: row.get(4)?,
                    created_by: row.get(5)?,
                    created_at: row.get::<_, i64>(6)? as u64,
                    updated_at: row.get::<_, i64>(7)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// All conversations the user participates in, most recently active
    /// first.
    pub fn list_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.conversation_id, c.is_group, c.group_name, c.group_description,
                    c.group_avatar_url, c.created_by, c.created_at, c.updated_at
             FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.conversation_id
             WHERE p.profile_id = ?1
             ORDER BY c.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConversationRow {
                conversation_id: row.get(0)?,
                is_group: row.get::<_, i32>(1)? != 0,
                group_name: row.get(2)?,
                group_description: row.get(3)?,
                group_avatar_url: row.get(4)?,
                created_by: row.get(5)?,
                created_at: row.get::<_, i64>(6)? as u64,
                updated_at: row.get::<_, i64>(7)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Look up the direct (non-group) conversation containing both users, if
    /// one exists. At most one should; duplicates would be a data defect.
    pub fn find_direct_conversation(
        &self,
        user_id: &str,
        other_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.conversation_id
             FROM conversations c
             WHERE c.is_group = 0
               AND EXISTS (SELECT 1 FROM conversation_participants p
                           WHERE p.conversation_id = c.conversation_id
                             AND p.profile_id = ?1)
               AND EXISTS (SELECT 1 FROM conversation_participants p
                           WHERE p.conversation_id = c.conversation_id
                             AND p.profile_id = ?2)
             LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![user_id, other_id], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(row)
    }

    /// Create a direct conversation between two users: the conversation row,
    /// then both participant rows. Two sequential writes, no transaction; if
    /// the participant step fails the orphaned conversation row is deleted so
    /// no empty conversation leaks.
    pub fn create_direct_conversation(
        &self,
        user_id: &str,
        other_id: &str,
        now: u64,
    ) -> Result<String, StorageError> {
        let conversation_id = Uuid::new_v4().to_string();
        self.insert_conversation(&ConversationRow {
            conversation_id: conversation_id.clone(),
            is_group: false,
            group_name: None,
            group_description: None,
            group_avatar_url: None,
            created_by: Some(user_id.to_string()),
            created_at: now,
            updated_at: now,
        })?;

        let participants = [
            ParticipantRow {
                conversation_id: conversation_id.clone(),
                profile_id: user_id.to_string(),
                joined_at: now,
            },
            ParticipantRow {
                conversation_id: conversation_id.clone(),
                profile_id: other_id.to_string(),
                joined_at: now,
            },
        ];
        for p in &participants {
            if let Err(e) = self.insert_participant(p) {
                let _ = self.delete_participants(&conversation_id);
                let _ = self.delete_conversation(&conversation_id);
                return Err(e);
            }
        }
        Ok(conversation_id)
    }

    pub fn insert_participant(&self, row: &ParticipantRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO conversation_participants (conversation_id, profile_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![row.conversation_id, row.profile_id, row.joined_at as i64],
        )?;
        Ok(())
    }

    pub fn participants_of(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, profile_id, joined_at
             FROM conversation_participants
             WHERE conversation_id = ?1
             ORDER BY joined_at",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(ParticipantRow {
                conversation_id: row.get(0)?,
                profile_id: row.get(1)?,
                joined_at: row.get::<_, i64>(2)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn is_participant(
        &self,
        conversation_id: &str,
        profile_id: &str,
    ) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_participants
             WHERE conversation_id = ?1 AND profile_id = ?2",
            params![conversation_id, profile_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Bump a conversation's last-activity timestamp. Returns false if the
    /// conversation does not exist.
    pub fn touch_conversation(
        &self,
        conversation_id: &str,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE conversation_id = ?1",
            params![conversation_id, now as i64],
        )?;
        Ok(affected > 0)
    }

    fn delete_conversation(&self, conversation_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(affected > 0)
    }

    fn delete_participants(&self, conversation_id: &str) -> Result<u32, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM conversation_participants WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(affected as u32)
    }

    fn delete_group_members(&self, conversation_id: &str) -> Result<u32, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM group_members WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(affected as u32)
    }

    // -----------------------------------------------------------------------
    // Group membership
    // -----------------------------------------------------------------------

    /// Create a group conversation with role-tagged membership: the creator
    /// becomes the sole lead, everyone else a member, and every member is
    /// mirrored into conversation_participants so message and unread-count
    /// queries work unchanged for groups. Membership failure compensates by
    /// deleting everything written so far, the same undo-step-1 shape the
    /// direct-conversation path uses.
    pub fn create_group_conversation(
        &self,
        name: &str,
        description: Option<&str>,
        avatar_url: Option<&str>,
        creator_id: &str,
        member_ids: &[String],
        now: u64,
    ) -> Result<String, StorageError> {
        let conversation_id = Uuid::new_v4().to_string();
        self.insert_conversation(&ConversationRow {
            conversation_id: conversation_id.clone(),
            is_group: true,
            group_name: Some(name.to_string()),
            group_description: description.map(str::to_string),
            group_avatar_url: avatar_url.map(str::to_string),
            created_by: Some(creator_id.to_string()),
            created_at: now,
            updated_at: now,
        })?;

        let mut members: Vec<GroupMemberRow> = vec![GroupMemberRow {
            conversation_id: conversation_id.clone(),
            profile_id: creator_id.to_string(),
            role: "lead".to_string(),
            joined_at: now,
            added_by: None,
        }];
        for member_id in member_ids {
            if member_id == creator_id {
                continue;
            }
            members.push(GroupMemberRow {
                conversation_id: conversation_id.clone(),
                profile_id: member_id.clone(),
                role: "member".to_string(),
                joined_at: now,
                added_by: Some(creator_id.to_string()),
            });
        }

        for member in &members {
            let result = self.insert_group_member(member).and_then(|()| {
                self.insert_participant(&ParticipantRow {
                    conversation_id: conversation_id.clone(),
                    profile_id: member.profile_id.clone(),
                    joined_at: now,
                })
            });
            if let Err(e) = result {
                let _ = self.delete_group_members(&conversation_id);
                let _ = self.delete_participants(&conversation_id);
                let _ = self.delete_conversation(&conversation_id);
                return Err(e);
            }
        }
        Ok(conversation_id)
    }

    pub fn insert_group_member(&self, row: &GroupMemberRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO group_members (conversation_id, profile_id, role, joined_at, added_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.conversation_id,
                row.profile_id,
                row.role,
                row.joined_at as i64,
                row.added_by,
            ],
        )?;
        Ok(())
    }

    /// Add a member to an existing group: group_members plus the mirrored
    /// participant row. The participant mirror failing undoes the membership
    /// insert so the two tables never diverge.
    pub fn add_group_member(
        &self,
        conversation_id: &str,
        profile_id: &str,
        added_by: &str,
        now: u64,
    ) -> Result<(), StorageError> {
        self.insert_group_member(&GroupMemberRow {
            conversation_id: conversation_id.to_string(),
            profile_id: profile_id.to_string(),
            role: "member".to_string(),
            joined_at: now,
            added_by: Some(added_by.to_string()),
        })?;
        if let Err(e) = self.insert_participant(&ParticipantRow {
            conversation_id: conversation_id.to_string(),
            profile_id: profile_id.to_string(),
            joined_at: now,
        }) {
            let _ = self.conn.execute(
                "DELETE FROM group_members WHERE conversation_id = ?1 AND profile_id = ?2",
                params![conversation_id, profile_id],
            );
            return Err(e);
        }
        Ok(())
    }

    /// Remove a member from both tables; serves admin removal and self-leave.
    /// Returns false if no membership row existed.
    pub fn remove_group_member(
        &self,
        conversation_id: &str,
        profile_id: &str,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM group_members WHERE conversation_id = ?1 AND profile_id = ?2",
            params![conversation_id, profile_id],
        )?;
        self.conn.execute(
            "DELETE FROM conversation_participants
             WHERE conversation_id = ?1 AND profile_id = ?2",
            params![conversation_id, profile_id],
        )?;
        Ok(affected > 0)
    }

    pub fn get_group_member(
        &self,
        conversation_id: &str,
        profile_id: &str,
    ) -> Result<Option<GroupMemberRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, profile_id, role, joined_at, added_by
             FROM group_members
             WHERE conversation_id = ?1 AND profile_id = ?2",
        )?;
        let row = stmt
            .query_row(params![conversation_id, profile_id], |row| {
                Ok(GroupMemberRow {
                    conversation_id: row.get(0)?,
                    profile_id: row.get(1)?,
                    role: row.get(2)?,
                    joined_at: row.get::<_, i64>(3)? as u64,
                    added_by: row.get(4)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn list_group_members(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<GroupMemberRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, profile_id, role, joined_at, added_by
             FROM group_members
             WHERE conversation_id = ?1
             ORDER BY joined_at",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(GroupMemberRow {
                conversation_id: row.get(0)?,
                profile_id: row.get(1)?,
                role: row.get(2)?,
                joined_at: row.get::<_, i64>(3)? as u64,
                added_by: row.get(4)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Leave a group. The lead is refused: there is no transfer-leadership
    /// operation, so a departing lead would leave the group unmanageable.
    pub fn leave_group(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<LeaveOutcome, StorageError> {
        match self.get_group_member(conversation_id, user_id)? {
            None => Ok(LeaveOutcome::NotMember),
            Some(m) if m.role == "lead" => Ok(LeaveOutcome::LeadRefused),
            Some(_) => {
                self.remove_group_member(conversation_id, user_id)?;
                Ok(LeaveOutcome::Left)
            }
        }
    }

    /// Set a member's role to "admin" or "member". The lead role is fixed at
    /// creation and never assigned here; permission enforcement lives with
    /// the caller, not the data layer. Returns false if no membership row.
    pub fn update_group_member_role(
        &self,
        conversation_id: &str,
        profile_id: &str,
        role: &str,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE group_members SET role = ?3
             WHERE conversation_id = ?1 AND profile_id = ?2",
            params![conversation_id, profile_id, role],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn insert_message(&self, row: &MessageRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO messages
             (message_id, conversation_id, sender_id, content, created_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.message_id,
                row.conversation_id,
                row.sender_id,
                row.content,
                row.created_at as i64,
                row.read_at.map(|t| t as i64),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, conversation_id, sender_id, content, created_at, read_at
             FROM messages WHERE message_id = ?1",
        )?;
        let row = stmt
            .query_row(params![message_id], |row| {
                Ok(MessageRow {
                    message_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get::<_, i64>(4)? as u64,
                    read_at: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                })
            })
            .optional()?;
        Ok(row)
    }

    /// All messages of a conversation in creation order (ascending).
    pub fn list_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, conversation_id, sender_id, content, created_at, read_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(MessageRow {
                message_id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
                read_at: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// The single most recent message of a conversation.
    pub fn last_message(
        &self,
        conversation_id: &str,
    ) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, conversation_id, sender_id, content, created_at, read_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![conversation_id], |row| {
                Ok(MessageRow {
                    message_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get::<_, i64>(4)? as u64,
                    read_at: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Count of unread messages in a conversation not sent by the viewer.
    pub fn unread_count(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
            params![conversation_id, viewer_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Stamp read_at on every unread message in the conversation not sent by
    /// the viewer. Idempotent: already-read messages are excluded by the
    /// filter, so a second invocation affects zero rows.
    pub fn mark_messages_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
        now: u64,
    ) -> Result<u32, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET read_at = ?3
             WHERE conversation_id = ?1 AND sender_id != ?2 AND read_at IS NULL",
            params![conversation_id, viewer_id, now as i64],
        )?;
        Ok(affected as u32)
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub fn insert_notification(&self, row: &NotificationRow) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO notifications (user_id, title, content, category, sender_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.user_id,
                row.title,
                row.content,
                row.category,
                row.sender_id,
                row.created_at as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_notifications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, content, category, sender_id, created_at
             FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(NotificationRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                category: row.get(4)?,
                sender_id: row.get(5)?,
                created_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// The merged notification feed: stored rows plus one synthesized entry
    /// per pending connection request addressed to the user, sorted newest
    /// first. Synthesized entries have no stored lifecycle — accepting or
    /// rejecting the underlying connection makes them disappear on the next
    /// fetch. Their connection_id carries the requester's user identifier,
    /// the key the accept/reject operations expect.
    pub fn notification_feed(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationFeedItem>, StorageError> {
        let mut items: Vec<NotificationFeedItem> = self
            .list_notifications_for_user(user_id)?
            .into_iter()
            .map(|n| NotificationFeedItem {
                id: Some(n.id),
                title: n.title,
                content: n.content,
                category: n.category,
                sender_id: n.sender_id,
                connection_id: None,
                created_at: n.created_at,
            })
            .collect();

        for req in self.list_pending_requests_to(user_id)? {
            let sender_name = self
                .get_profile(&req.sender_id)
                .ok()
                .flatten()
                .map(|p| p.display_name)
                .unwrap_or_else(|| req.sender_id.clone());
            items.push(NotificationFeedItem {
                id: None,
                title: "Connection Request".to_string(),
                content: format!("{sender_name} sent you a connection request"),
                category: "connection_request".to_string(),
                sender_id: Some(req.sender_id.clone()),
                connection_id: Some(req.sender_id),
                created_at: req.created_at,
            });
        }

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    // -----------------------------------------------------------------------
    // Social feed: posts, likes, comments, polls
    // -----------------------------------------------------------------------

    pub fn insert_post(&self, row: &PostRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO social_posts (post_id, author_id, content, media_url, poll_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.post_id,
                row.author_id,
                row.content,
                row.media_url,
                row.poll_id,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_post(&self, post_id: &str) -> Result<Option<PostRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT post_id, author_id, content, media_url, poll_id, created_at
             FROM social_posts WHERE post_id = ?1",
        )?;
        let row = stmt
            .query_row(params![post_id], |row| {
                Ok(PostRow {
                    post_id: row.get(0)?,
                    author_id: row.get(1)?,
                    content: row.get(2)?,
                    media_url: row.get(3)?,
                    poll_id: row.get(4)?,
                    created_at: row.get::<_, i64>(5)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// The feed: every post, newest first.
    pub fn list_posts(&self) -> Result<Vec<PostRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT post_id, author_id, content, media_url, poll_id, created_at
             FROM social_posts
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PostRow {
                post_id: row.get(0)?,
                author_id: row.get(1)?,
                content: row.get(2)?,
                media_url: row.get(3)?,
                poll_id: row.get(4)?,
                created_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Record a like. Idempotent: liking an already-liked post affects no
    /// rows and returns false.
    pub fn insert_post_like(
        &self,
        post_id: &str,
        profile_id: &str,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO post_likes (post_id, profile_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![post_id, profile_id, now as i64],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_post_like(&self, post_id: &str, profile_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM post_likes WHERE post_id = ?1 AND profile_id = ?2",
            params![post_id, profile_id],
        )?;
        Ok(affected > 0)
    }

    pub fn count_post_likes(&self, post_id: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn has_liked(&self, post_id: &str, profile_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1 AND profile_id = ?2",
            params![post_id, profile_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_comment(&self, row: &CommentRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO post_comments (comment_id, post_id, author_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.comment_id,
                row.post_id,
                row.author_id,
                row.content,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn list_comments(&self, post_id: &str) -> Result<Vec<CommentRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT comment_id, post_id, author_id, content, created_at
             FROM post_comments
             WHERE post_id = ?1
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![post_id], |row| {
            Ok(CommentRow {
                comment_id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn count_comments(&self, post_id: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post_comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn insert_poll(&self, row: &PollRow) -> Result<(), StorageError> {
        let options = serde_json::to_string(&row.options)?;
        self.conn.execute(
            "INSERT INTO polls (poll_id, question, options, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.poll_id, row.question, options, row.created_at as i64],
        )?;
        Ok(())
    }

    /// Compensation step for the post-creation saga: the poll row is written
    /// before the post row, so a failed post insert undoes the poll.
    pub fn delete_poll(&self, poll_id: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM polls WHERE poll_id = ?1", params![poll_id])?;
        Ok(affected > 0)
    }

    pub fn get_poll(&self, poll_id: &str) -> Result<Option<PollRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT poll_id, question, options, created_at FROM polls WHERE poll_id = ?1",
        )?;
        let raw = stmt
            .query_row(params![poll_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? as u64,
                ))
            })
            .optional()?;
        match raw {
            Some((poll_id, question, options, created_at)) => Ok(Some(PollRow {
                poll_id,
                question,
                options: serde_json::from_str(&options)?,
                created_at,
            })),
            None => Ok(None),
        }
    }

    /// Record or replace a vote. One vote per user is enforced by the
    /// (poll_id, voter_id) primary key; re-voting replaces the prior choice.
    pub fn upsert_poll_vote(
        &self,
        poll_id: &str,
        voter_id: &str,
        option_index: u32,
        now: u64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO poll_votes (poll_id, voter_id, option_index, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![poll_id, voter_id, option_index as i64, now as i64],
        )?;
        Ok(())
    }

    pub fn get_poll_vote(
        &self,
        poll_id: &str,
        voter_id: &str,
    ) -> Result<Option<u32>, StorageError> {
        let vote = self
            .conn
            .query_row(
                "SELECT option_index FROM poll_votes WHERE poll_id = ?1 AND voter_id = ?2",
                params![poll_id, voter_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(vote.map(|v| v as u32))
    }

    /// Vote tally per option, indexed to match the poll's options list.
    pub fn poll_vote_counts(
        &self,
        poll_id: &str,
        option_count: usize,
    ) -> Result<Vec<u32>, StorageError> {
        let mut counts = vec![0u32; option_count];
        let mut stmt = self.conn.prepare(
            "SELECT option_index, COUNT(*) FROM poll_votes
             WHERE poll_id = ?1 GROUP BY option_index",
        )?;
        let rows = stmt.query_map(params![poll_id], |row| {
            Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u32))
        })?;
        for row in rows {
            let (index, count) = row?;
            if index < counts.len() {
                counts[index] = count;
            }
        }
        Ok(counts)
    }
}

/// Derive the database file path inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("connect.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn test_profile(user_id: &str, name: &str) -> ProfileRow {
        let now = now_secs();
        ProfileRow {
            user_id: user_id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
            role: "student".to_string(),
            phone: None,
            bio: None,
            department: None,
            prn: None,
            branch: None,
            year: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_schema_creation() {
        let storage = test_storage();
        storage.insert_profile(&test_profile("u1", "Asha")).unwrap();
    }

    #[test]
    fn test_profile_crud() {
        let storage = test_storage();
        storage.insert_profile(&test_profile("u1", "Asha")).unwrap();

        let loaded = storage.get_profile("u1").unwrap().unwrap();
        assert_eq!(loaded.display_name, "Asha");
        assert_eq!(loaded.role, "student");

        // Duplicate signup is rejected
        let err = storage.insert_profile(&test_profile("u1", "Asha")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        // Owner mutation
        let mut updated = loaded.clone();
        updated.bio = Some("CS, third year".to_string());
        updated.department = Some("Computer Engineering".to_string());
        assert!(storage.update_profile(&updated).unwrap());
        let loaded = storage.get_profile("u1").unwrap().unwrap();
        assert_eq!(loaded.bio.as_deref(), Some("CS, third year"));

        // Updating a missing profile affects nothing
        assert!(!storage.update_profile(&test_profile("ghost", "x")).unwrap());
    }

    #[test]
    fn test_connection_lifecycle() {
        let storage = test_storage();
        let now = now_secs();

        storage.insert_connection("alice", "bob", now).unwrap();
        let edge = storage.connection_between("alice", "bob").unwrap().unwrap();
        assert_eq!(edge.status, "pending");
        assert_eq!(edge.sender_id, "alice");

        // Accept keyed by the wrong direction does nothing
        assert!(!storage.accept_connection("bob", "alice", now).unwrap());

        // Accept in the stored direction flips the edge
        assert!(storage.accept_connection("alice", "bob", now).unwrap());
        let edge = storage.connection_between("bob", "alice").unwrap().unwrap();
        assert_eq!(edge.status, "accepted");

        // No edge may go pending again while accepted exists: accept is a no-op
        assert!(!storage.accept_connection("alice", "bob", now).unwrap());
    }

    #[test]
    fn test_connection_cancel_and_reject() {
        let storage = test_storage();
        let now = now_secs();

        storage.insert_connection("alice", "bob", now).unwrap();
        // Cancel the exact pending edge
        assert!(storage.delete_pending_connection("alice", "bob").unwrap());
        assert!(storage.connection_between("alice", "bob").unwrap().is_none());

        // Cancelling again is a not-found outcome
        assert!(!storage.delete_pending_connection("alice", "bob").unwrap());

        // Reject is the receiver deleting the same edge
        storage.insert_connection("carol", "bob", now).unwrap();
        assert!(storage.delete_pending_connection("carol", "bob").unwrap());
        assert!(storage.connection_between("carol", "bob").unwrap().is_none());
    }

    #[test]
    fn test_remove_connection_fallback_direction() {
        let storage = test_storage();
        let now = now_secs();

        // Edge stored as bob -> alice; removal asked as (alice, bob) must
        // still succeed via the fallback direction.
        storage.insert_connection("bob", "alice", now).unwrap();
        storage.accept_connection("bob", "alice", now).unwrap();
        assert!(storage.remove_connection("alice", "bob").unwrap());
        assert!(storage.connection_between("alice", "bob").unwrap().is_none());

        // Removing a non-existent connection reports not-found
        assert!(!storage.remove_connection("alice", "bob").unwrap());
    }

    #[test]
    fn test_duplicate_pending_race_is_accepted_behavior() {
        let storage = test_storage();
        let now = now_secs();

        // Two clients send requests to each other before either sees the
        // other's row. The insert path does no pre-check, so both land.
        storage.insert_connection("alice", "bob", now).unwrap();
        storage.insert_connection("bob", "alice", now).unwrap();

        let to_bob = storage.list_pending_requests_to("bob").unwrap();
        let to_alice = storage.list_pending_requests_to("alice").unwrap();
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_alice.len(), 1);
    }

    #[test]
    fn test_direct_conversation_create_and_find() {
        let storage = test_storage();
        let now = now_secs();

        assert!(storage.find_direct_conversation("alice", "bob").unwrap().is_none());

        let id = storage.create_direct_conversation("alice", "bob", now).unwrap();

        // Exactly two participant rows, referencing both users
        let participants = storage.participants_of(&id).unwrap();
        assert_eq!(participants.len(), 2);
        let ids: Vec<&str> = participants.iter().map(|p| p.profile_id.as_str()).collect();
        assert!(ids.contains(&"alice"));
        assert!(ids.contains(&"bob"));

        // Lookup is direction-agnostic and idempotent
        assert_eq!(storage.find_direct_conversation("bob", "alice").unwrap(), Some(id.clone()));
        assert_eq!(storage.find_direct_conversation("alice", "bob").unwrap(), Some(id));
    }

    #[test]
    fn test_group_creation_members_and_roles() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage
            .create_group_conversation(
                "Project Group",
                Some("Sem 6 mini project"),
                None,
                "alice",
                &["bob".to_string(), "carol".to_string()],
                now,
            )
            .unwrap();

        let members = storage.list_group_members(&id).unwrap();
        assert_eq!(members.len(), 3);
        let role_of = |user: &str| {
            members
                .iter()
                .find(|m| m.profile_id == user)
                .map(|m| m.role.clone())
                .unwrap()
        };
        assert_eq!(role_of("alice"), "lead");
        assert_eq!(role_of("bob"), "member");
        assert_eq!(role_of("carol"), "member");

        // All members mirrored into conversation_participants
        assert_eq!(storage.participants_of(&id).unwrap().len(), 3);

        let conversation = storage.get_conversation(&id).unwrap().unwrap();
        assert!(conversation.is_group);
        assert_eq!(conversation.group_name.as_deref(), Some("Project Group"));
    }

    #[test]
    fn test_group_creation_compensates_on_member_failure() {
        let storage = test_storage();
        let now = now_secs();

        // A duplicated member id violates the membership primary key partway
        // through; the saga must undo the conversation row and every row
        // already written.
        let result = storage.create_group_conversation(
            "Broken",
            None,
            None,
            "alice",
            &["bob".to_string(), "bob".to_string()],
            now,
        );
        assert!(result.is_err());

        assert!(storage.list_conversations_for_user("alice").unwrap().is_empty());
        assert!(storage.list_conversations_for_user("bob").unwrap().is_empty());
    }

    #[test]
    fn test_add_and_remove_group_member() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage
            .create_group_conversation("G", None, None, "alice", &["bob".to_string()], now)
            .unwrap();

        storage.add_group_member(&id, "dave", "alice", now).unwrap();
        assert_eq!(storage.list_group_members(&id).unwrap().len(), 3);
        assert!(storage.is_participant(&id, "dave").unwrap());

        assert!(storage.remove_group_member(&id, "dave").unwrap());
        assert_eq!(storage.list_group_members(&id).unwrap().len(), 2);
        assert!(!storage.is_participant(&id, "dave").unwrap());

        // Removing a non-member reports not-found
        assert!(!storage.remove_group_member(&id, "dave").unwrap());
    }

    #[test]
    fn test_update_group_member_role() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage
            .create_group_conversation("G", None, None, "alice", &["bob".to_string()], now)
            .unwrap();

        assert!(storage.update_group_member_role(&id, "bob", "admin").unwrap());
        let bob = storage.get_group_member(&id, "bob").unwrap().unwrap();
        assert_eq!(bob.role, "admin");

        assert!(!storage.update_group_member_role(&id, "ghost", "admin").unwrap());
    }

    #[test]
    fn test_message_roundtrip_and_order() {
        let storage = test_storage();
        let now = now_secs();
        let conv = storage.create_direct_conversation("alice", "bob", now).unwrap();

        for i in 0..3 {
            storage
                .insert_message(&MessageRow {
                    message_id: format!("m{i}"),
                    conversation_id: conv.clone(),
                    sender_id: "alice".to_string(),
                    content: format!("hello {i}"),
                    created_at: now + i,
                    read_at: None,
                })
                .unwrap();
        }

        let messages = storage.list_conversation_messages(&conv).unwrap();
        assert_eq!(messages.len(), 3);
        // Creation order, ascending
        assert_eq!(messages[0].content, "hello 0");
        assert_eq!(messages[2].content, "hello 2");
        assert_eq!(messages[0].sender_id, "alice");

        let last = storage.last_message(&conv).unwrap().unwrap();
        assert_eq!(last.content, "hello 2");
    }

    #[test]
    fn test_mark_read_idempotent() {
        let storage = test_storage();
        let now = now_secs();
        let conv = storage.create_direct_conversation("alice", "bob", now).unwrap();

        storage
            .insert_message(&MessageRow {
                message_id: "m1".to_string(),
                conversation_id: conv.clone(),
                sender_id: "alice".to_string(),
                content: "hi".to_string(),
                created_at: now,
                read_at: None,
            })
            .unwrap();

        assert_eq!(storage.unread_count(&conv, "bob").unwrap(), 1);
        // The sender's own unread view excludes their messages
        assert_eq!(storage.unread_count(&conv, "alice").unwrap(), 0);

        // First invocation stamps, second is a no-op
        assert_eq!(storage.mark_messages_read(&conv, "bob", now + 5).unwrap(), 1);
        assert_eq!(storage.mark_messages_read(&conv, "bob", now + 9).unwrap(), 0);

        let msg = storage.get_message("m1").unwrap().unwrap();
        assert_eq!(msg.read_at, Some(now + 5));
        assert_eq!(storage.unread_count(&conv, "bob").unwrap(), 0);
    }

    #[test]
    fn test_touch_conversation_reorders_listing() {
        let storage = test_storage();
        let now = now_secs();

        let first = storage.create_direct_conversation("alice", "bob", now).unwrap();
        let second = storage.create_direct_conversation("alice", "carol", now + 1).unwrap();

        let listed = storage.list_conversations_for_user("alice").unwrap();
        assert_eq!(listed[0].conversation_id, second);

        // New activity in the older conversation bumps it to the top
        assert!(storage.touch_conversation(&first, now + 10).unwrap());
        let listed = storage.list_conversations_for_user("alice").unwrap();
        assert_eq!(listed[0].conversation_id, first);

        assert!(!storage.touch_conversation("missing", now).unwrap());
    }

    #[test]
    fn test_notification_feed_merges_and_sorts() {
        let storage = test_storage();
        let now = now_secs();

        storage.insert_profile(&test_profile("alice", "Asha Patil")).unwrap();
        storage
            .insert_notification(&NotificationRow {
                id: 0,
                user_id: "bob".to_string(),
                title: "Welcome".to_string(),
                content: "Welcome to PCCOE Connect".to_string(),
                category: "announcement".to_string(),
                sender_id: None,
                created_at: now,
            })
            .unwrap();
        storage.insert_connection("alice", "bob", now + 5).unwrap();

        let feed = storage.notification_feed("bob").unwrap();
        assert_eq!(feed.len(), 2);

        // Reverse chronological: the synthesized request is newer
        assert_eq!(feed[0].title, "Connection Request");
        assert_eq!(feed[0].category, "connection_request");
        assert!(feed[0].content.contains("Asha Patil"));
        // connection_id carries the requester's user id, not a row id
        assert_eq!(feed[0].connection_id.as_deref(), Some("alice"));
        assert!(feed[0].id.is_none());

        assert_eq!(feed[1].title, "Welcome");
        assert!(feed[1].id.is_some());

        // Accepting the request removes the synthesized entry on next fetch
        storage.accept_connection("alice", "bob", now + 6).unwrap();
        let feed = storage.notification_feed("bob").unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Welcome");
    }

    #[test]
    fn test_feed_post_like_comment() {
        let storage = test_storage();
        let now = now_secs();

        storage
            .insert_post(&PostRow {
                post_id: "p1".to_string(),
                author_id: "alice".to_string(),
                content: "First day at campus!".to_string(),
                media_url: None,
                poll_id: None,
                created_at: now,
            })
            .unwrap();

        // Like is idempotent
        assert!(storage.insert_post_like("p1", "bob", now).unwrap());
        assert!(!storage.insert_post_like("p1", "bob", now).unwrap());
        assert_eq!(storage.count_post_likes("p1").unwrap(), 1);
        assert!(storage.has_liked("p1", "bob").unwrap());

        assert!(storage.delete_post_like("p1", "bob").unwrap());
        assert!(!storage.has_liked("p1", "bob").unwrap());

        storage
            .insert_comment(&CommentRow {
                comment_id: "c1".to_string(),
                post_id: "p1".to_string(),
                author_id: "bob".to_string(),
                content: "Congrats!".to_string(),
                created_at: now,
            })
            .unwrap();
        assert_eq!(storage.count_comments("p1").unwrap(), 1);
        assert_eq!(storage.list_comments("p1").unwrap()[0].content, "Congrats!");
    }

    #[test]
    fn test_poll_vote_replaces() {
        let storage = test_storage();
        let now = now_secs();

        storage
            .insert_poll(&PollRow {
                poll_id: "poll1".to_string(),
                question: "Best fest day?".to_string(),
                options: vec!["Day 1".to_string(), "Day 2".to_string()],
                created_at: now,
            })
            .unwrap();

        storage.upsert_poll_vote("poll1", "bob", 0, now).unwrap();
        storage.upsert_poll_vote("poll1", "carol", 1, now).unwrap();
        // Re-voting replaces, it does not add
        storage.upsert_poll_vote("poll1", "bob", 1, now + 1).unwrap();

        let poll = storage.get_poll("poll1").unwrap().unwrap();
        assert_eq!(poll.options.len(), 2);
        let counts = storage.poll_vote_counts("poll1", poll.options.len()).unwrap();
        assert_eq!(counts, vec![0, 2]);
        assert_eq!(storage.get_poll_vote("poll1", "bob").unwrap(), Some(1));
    }

    #[test]
    fn test_search_restricted_to_accepted_connections() {
        let storage = test_storage();
        let now = now_secs();

        storage.insert_profile(&test_profile("alice", "Asha Patil")).unwrap();
        storage.insert_profile(&test_profile("bob", "Rohan Deshmukh")).unwrap();
        storage.insert_profile(&test_profile("carol", "Rohini Joshi")).unwrap();

        // bob is connected to alice; carol is not
        storage.insert_connection("bob", "alice", now).unwrap();
        storage.accept_connection("bob", "alice", now).unwrap();

        let results = storage.search_connected_profiles("alice", "Roh").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "bob");

        // A pending edge is not enough to be discoverable
        storage.insert_connection("carol", "alice", now).unwrap();
        let results = storage.search_connected_profiles("alice", "Roh").unwrap();
        assert_eq!(results.len(), 1);
    }
}
