//! Operations on [`Group`] and [`GroupMember`] records.

use rusqlite::{params, OptionalExtension};

use courier_shared::constants::DEFAULT_AVATAR;
use courier_shared::types::{GroupId, MemberRole, MembershipId, UserId};

use crate::database::{self, parse_column, parse_enum_column, Database};
use crate::error::{Result, StoreError};
use crate::models::{Group, GroupMember, NewGroup};

const GROUP_COLUMNS: &str = "id, name, description, avatar, creator_id, created_at, updated_at";
const MEMBER_COLUMNS: &str = "id, group_id, user_id, role, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group and enrol its creator as `admin`.
    ///
    /// The two inserts are not transactional: if the membership insert
    /// fails the error is returned and the group is left without members.
    pub fn create_group(&self, new: &NewGroup, creator_id: UserId) -> Result<Group> {
        if !self.user_exists(creator_id)? {
            return Err(StoreError::NotFound);
        }

        let now = database::now();
        let group = Group {
            id: GroupId::generate(),
            name: new.name.clone(),
            description: new.description.clone(),
            avatar: new
                .avatar
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            creator_id,
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            "INSERT INTO chat_groups (id, name, description, avatar, creator_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group.id.to_hex(),
                group.name,
                group.description,
                group.avatar,
                creator_id.to_hex(),
                now.timestamp_millis(),
                now.timestamp_millis(),
            ],
        )?;

        if let Err(e) = self.add_group_member(group.id, creator_id, MemberRole::Admin) {
            tracing::warn!(group = %group.id, error = %e, "group created without its admin");
            return Err(e);
        }

        Ok(group)
    }

    /// Fetch a live group. Soft-deleted groups are reported as not found.
    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        self.conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM chat_groups WHERE id = ?1 AND deleted = 0"),
                params![id.to_hex()],
                row_to_group,
            )
            .map_err(database::not_found)
    }

    /// Live groups in which `user_id` holds a live membership.
    pub fn list_groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT g.id, g.name, g.description, g.avatar, g.creator_id, g.created_at, g.updated_at
             FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.user_id = ?1 AND m.deleted = 0 AND g.deleted = 0
             ORDER BY g.created_at ASC",
        )?;

        let rows = stmt.query_map(params![user_id.to_hex()], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    pub fn soft_delete_group(&self, id: GroupId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chat_groups SET deleted = 1, updated_at = ?2 WHERE id = ?1 AND deleted = 0",
            params![id.to_hex(), database::now().timestamp_millis()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    /// Enrol `user_id` in `group_id`.
    ///
    /// Fails with `NotFound` if the group or user is missing and `Conflict`
    /// if the user already holds a live membership.
    pub fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        role: MemberRole,
    ) -> Result<GroupMember> {
        self.get_group(group_id)?;
        if !self.user_exists(user_id)? {
            return Err(StoreError::NotFound);
        }
        if self.get_membership(group_id, user_id)?.is_some() {
            return Err(StoreError::Conflict("User is already a group member".into()));
        }

        let now = database::now();
        let member = GroupMember {
            id: MembershipId::generate(),
            group_id,
            user_id,
            role,
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO group_members (id, group_id, user_id, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    member.id.to_hex(),
                    group_id.to_hex(),
                    user_id.to_hex(),
                    role.as_str(),
                    now.timestamp_millis(),
                    now.timestamp_millis(),
                ],
            )
            .map_err(|e| database::conflict(e, "User is already a group member"))?;

        Ok(member)
    }

    /// The live membership of `user_id` in `group_id`, if any.
    pub fn get_membership(&self, group_id: GroupId, user_id: UserId) -> Result<Option<GroupMember>> {
        let member = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM group_members
                     WHERE group_id = ?1 AND user_id = ?2 AND deleted = 0"
                ),
                params![group_id.to_hex(), user_id.to_hex()],
                row_to_member,
            )
            .optional()?;
        Ok(member)
    }

    pub fn is_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        Ok(self.get_membership(group_id, user_id)?.is_some())
    }

    /// All live members of a group, in enrolment order.
    pub fn list_group_members(&self, group_id: GroupId) -> Result<Vec<GroupMember>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members
             WHERE group_id = ?1 AND deleted = 0
             ORDER BY seq ASC"
        ))?;

        let rows = stmt.query_map(params![group_id.to_hex()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Soft-delete a membership. Returns `true` if a live row was marked.
    pub fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE group_members SET deleted = 1, updated_at = ?3
             WHERE group_id = ?1 AND user_id = ?2 AND deleted = 0",
            params![
                group_id.to_hex(),
                user_id.to_hex(),
                database::now().timestamp_millis()
            ],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: parse_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        avatar: row.get(3)?,
        creator_id: parse_column(row, 4)?,
        created_at: database::millis_to_datetime(row.get(5)?),
        updated_at: database::millis_to_datetime(row.get(6)?),
    })
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMember> {
    Ok(GroupMember {
        id: parse_column(row, 0)?,
        group_id: parse_column(row, 1)?,
        user_id: parse_column(row, 2)?,
        role: parse_enum_column(row, 3, MemberRole::parse)?,
        created_at: database::millis_to_datetime(row.get(4)?),
        updated_at: database::millis_to_datetime(row.get(5)?),
    })
}
