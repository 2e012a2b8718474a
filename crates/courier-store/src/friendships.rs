//! Operations on [`Friendship`] edges.
//!
//! Edges are stored with the orientation they were created with, but every
//! lookup here matches both `(a, b)` and `(b, a)`.

use rusqlite::{params, OptionalExtension};

use courier_shared::types::{FriendshipId, FriendshipStatus, UserId};

use crate::database::{self, parse_column, parse_enum_column, Database};
use crate::error::{Result, StoreError};
use crate::models::Friendship;

const FRIENDSHIP_COLUMNS: &str = "id, user_id, friend_id, status, created_at, updated_at";

impl Database {
    /// Create a `pending` edge from `user_id` to `friend_id`.
    ///
    /// Fails with `NotFound` if either user is missing and `Conflict` if a
    /// live edge already exists in either orientation.
    pub fn add_friendship(&self, user_id: UserId, friend_id: UserId) -> Result<Friendship> {
        if user_id == friend_id {
            return Err(StoreError::InvalidValue(
                "Cannot befriend yourself".into(),
            ));
        }
        if !self.user_exists(user_id)? || !self.user_exists(friend_id)? {
            return Err(StoreError::NotFound);
        }
        if self.find_friendship(user_id, friend_id, None)?.is_some() {
            return Err(StoreError::Conflict("Friendship already exists".into()));
        }

        let now = database::now();
        let friendship = Friendship {
            id: FriendshipId::generate(),
            user_id,
            friend_id,
            status: FriendshipStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO friendships (id, user_id, friend_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    friendship.id.to_hex(),
                    user_id.to_hex(),
                    friend_id.to_hex(),
                    friendship.status.as_str(),
                    now.timestamp_millis(),
                    now.timestamp_millis(),
                ],
            )
            .map_err(|e| database::conflict(e, "Friendship already exists"))?;

        Ok(friendship)
    }

    /// Move a live edge to `status`. Returns `true` if a row changed.
    pub fn set_friendship_status(&self, id: FriendshipId, status: FriendshipStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE friendships SET status = ?2, updated_at = ?3 WHERE id = ?1 AND deleted = 0",
            params![id.to_hex(), status.as_str(), database::now().timestamp_millis()],
        )?;
        Ok(affected > 0)
    }

    /// The live edge between `a` and `b` in either orientation, optionally
    /// restricted to one status.
    pub fn find_friendship(
        &self,
        a: UserId,
        b: UserId,
        status: Option<FriendshipStatus>,
    ) -> Result<Option<Friendship>> {
        let friendship = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
                     WHERE deleted = 0
                       AND ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))
                       AND (?3 IS NULL OR status = ?3)"
                ),
                params![a.to_hex(), b.to_hex(), status.map(|s| s.as_str())],
                row_to_friendship,
            )
            .optional()?;
        Ok(friendship)
    }

    /// Whether an `accepted` edge links the two users.
    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        Ok(self
            .find_friendship(a, b, Some(FriendshipStatus::Accepted))?
            .is_some())
    }

    /// All live edges touching `user_id`, optionally filtered by status.
    pub fn list_friendships(
        &self,
        user_id: UserId,
        status: Option<FriendshipStatus>,
    ) -> Result<Vec<Friendship>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
             WHERE deleted = 0
               AND (user_id = ?1 OR friend_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(
            params![user_id.to_hex(), status.map(|s| s.as_str())],
            row_to_friendship,
        )?;

        let mut friendships = Vec::new();
        for row in rows {
            friendships.push(row?);
        }
        Ok(friendships)
    }

    /// Soft-delete an edge. Returns `true` if a live row was marked.
    pub fn soft_delete_friendship(&self, id: FriendshipId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE friendships SET deleted = 1, updated_at = ?2 WHERE id = ?1 AND deleted = 0",
            params![id.to_hex(), database::now().timestamp_millis()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_friendship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: parse_column(row, 0)?,
        user_id: parse_column(row, 1)?,
        friend_id: parse_column(row, 2)?,
        status: parse_enum_column(row, 3, FriendshipStatus::parse)?,
        created_at: database::millis_to_datetime(row.get(4)?),
        updated_at: database::millis_to_datetime(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("alice", None).unwrap().id;
        let b = db.create_user("bob", None).unwrap().id;
        (db, a, b)
    }

    #[test]
    fn test_edge_is_undirected_for_lookup() {
        let (db, a, b) = setup();
        let edge = db.add_friendship(a, b).unwrap();
        assert_eq!(edge.status, FriendshipStatus::Pending);

        assert!(!db.are_friends(a, b).unwrap());
        assert!(db.set_friendship_status(edge.id, FriendshipStatus::Accepted).unwrap());

        assert!(db.are_friends(a, b).unwrap());
        assert!(db.are_friends(b, a).unwrap());
        assert_eq!(db.find_friendship(b, a, None).unwrap().unwrap().id, edge.id);
    }

    #[test]
    fn test_duplicate_edge_conflicts_in_either_orientation() {
        let (db, a, b) = setup();
        db.add_friendship(a, b).unwrap();

        assert!(matches!(db.add_friendship(a, b), Err(StoreError::Conflict(_))));
        assert!(matches!(db.add_friendship(b, a), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_soft_delete_allows_new_edge() {
        let (db, a, b) = setup();
        let edge = db.add_friendship(a, b).unwrap();
        db.set_friendship_status(edge.id, FriendshipStatus::Accepted).unwrap();

        assert!(db.soft_delete_friendship(edge.id).unwrap());
        assert!(!db.are_friends(a, b).unwrap());
        assert!(db.list_friendships(a, None).unwrap().is_empty());

        db.add_friendship(b, a).unwrap();
    }

    #[test]
    fn test_missing_user_and_self_edge() {
        let (db, a, _) = setup();
        assert!(matches!(
            db.add_friendship(a, UserId::generate()),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.add_friendship(a, a),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_list_filters_by_status() {
        let (db, a, b) = setup();
        let c = db.create_user("carol", None).unwrap().id;
        let ab = db.add_friendship(a, b).unwrap();
        db.add_friendship(c, a).unwrap();
        db.set_friendship_status(ab.id, FriendshipStatus::Accepted).unwrap();

        assert_eq!(db.list_friendships(a, None).unwrap().len(), 2);
        let accepted = db
            .list_friendships(a, Some(FriendshipStatus::Accepted))
            .unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].other(a), b);
    }
}
