//! Authorization-gated message router.
//!
//! The only place where "may X message Y" is decided. Every send runs in
//! three steps:
//!
//! 1. **Check** the relationship (accepted friendship, or live group
//!    membership) and fail before anything is written.
//! 2. **Persist** the message. From here on the send has succeeded.
//! 3. **Push** one serialized envelope through the hub to every live
//!    recipient. Delivery problems are logged, never returned.
//!
//! Steps 1 and 2 run under the same database lock so a relationship cannot
//! change between the check and the insert.

use std::sync::{Arc, MutexGuard};

use tracing::{debug, error, info, warn};

use courier_shared::protocol::{GroupPush, PrivatePush, PushEnvelope, SenderProfile};
use courier_shared::types::{GroupId, UserId};
use courier_shared::validation::{parse_message_ids, validate_content, Pagination};
use courier_store::{Database, Message, MessageTarget, NewMessage, StoreError};

use crate::error::ServerError;
use crate::hub::Deliver;
use crate::state::{lock_db, SharedDatabase};

pub struct MessageRouter {
    db: SharedDatabase,
    delivery: Arc<dyn Deliver>,
}

impl MessageRouter {
    pub fn new(db: SharedDatabase, delivery: Arc<dyn Deliver>) -> Self {
        Self { db, delivery }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        lock_db(&self.db)
    }

    // ------------------------------------------------------------------
    // Sends
    // ------------------------------------------------------------------

    /// Send a direct message. Requires an accepted friendship in either
    /// orientation.
    pub fn send_private(
        &self,
        sender_id: UserId,
        receiver: &str,
        content: &str,
    ) -> Result<Message, ServerError> {
        validate_content(content)?;
        let receiver_id = UserId::from_hex(receiver).map_err(|_| receiver_not_found())?;

        let (message, sender) = {
            let db = self.lock()?;
            db.get_user(receiver_id).map_err(|e| or_not_found(e, receiver_not_found))?;
            if !db.are_friends(sender_id, receiver_id)? {
                return Err(ServerError::Forbidden(
                    "You are not friends with this user".into(),
                ));
            }
            let sender = sender_profile(&db, sender_id)?;
            let message = db.insert_message(&NewMessage {
                sender_id,
                target: MessageTarget::Private { receiver_id },
                content: content.to_string(),
            })?;
            (message, sender)
        };

        info!(
            message = %message.id,
            from = %sender_id,
            to = %receiver_id,
            "Private message stored"
        );

        let envelope = PushEnvelope::private(PrivatePush {
            id: message.id,
            from: sender_id,
            to: receiver_id,
            content: message.content.clone(),
            timestamp: message.timestamp,
            sender,
        });
        match envelope.to_payload() {
            Ok(payload) => self.delivery.send_to_user(receiver_id, &payload),
            Err(e) => error!(message = %message.id, error = %e, "Failed to serialize push envelope"),
        }

        Ok(message)
    }

    /// Send a message to a group the sender belongs to and push it to every
    /// other member.
    ///
    /// If listing members fails after the insert, the error is returned even
    /// though the message is already stored.
    pub fn send_group(
        &self,
        sender_id: UserId,
        group: &str,
        content: &str,
    ) -> Result<Message, ServerError> {
        validate_content(content)?;
        let group_id = GroupId::from_hex(group).map_err(|_| group_not_found())?;

        let (message, sender) = {
            let db = self.lock()?;
            db.get_group(group_id).map_err(|e| or_not_found(e, group_not_found))?;
            if !db.is_group_member(group_id, sender_id)? {
                return Err(ServerError::Forbidden(
                    "You are not a member of this group".into(),
                ));
            }
            let sender = sender_profile(&db, sender_id)?;
            let message = db.insert_message(&NewMessage {
                sender_id,
                target: MessageTarget::Group { group_id },
                content: content.to_string(),
            })?;
            (message, sender)
        };

        info!(
            message = %message.id,
            from = %sender_id,
            group = %group_id,
            "Group message stored"
        );

        let members = self
            .lock()
            .and_then(|db| db.list_group_members(group_id).map_err(ServerError::from))
            .map_err(|e| {
                error!(
                    message = %message.id,
                    group = %group_id,
                    error = %e,
                    "Member lookup failed after persisting; delivery skipped"
                );
                ServerError::Internal(format!("message {} stored but not delivered", message.id))
            })?;

        let envelope = PushEnvelope::group(GroupPush {
            id: message.id,
            sender_id,
            group_id,
            content: message.content.clone(),
            timestamp: message.timestamp,
            sender,
        });
        let payload = match envelope.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(message = %message.id, error = %e, "Failed to serialize push envelope");
                return Ok(message);
            }
        };

        let mut targets = 0;
        for member in members.iter().filter(|m| m.user_id != sender_id) {
            self.delivery.send_to_user(member.user_id, &payload);
            targets += 1;
        }
        debug!(message = %message.id, group = %group_id, targets, "Group fan-out done");

        Ok(message)
    }

    // ------------------------------------------------------------------
    // Read receipts
    // ------------------------------------------------------------------

    /// Mark messages as read in one batched update.
    ///
    /// Malformed ids are skipped; an input with no usable id is rejected.
    /// Any caller may mark any message: there is no recipient check here.
    pub fn mark_read<S: AsRef<str>>(&self, raw_ids: &[S]) -> Result<usize, ServerError> {
        let ids = parse_message_ids(raw_ids)?;
        let matched = self.lock()?.mark_messages_read(&ids)?;
        debug!(requested = raw_ids.len(), valid = ids.len(), matched, "Marked messages read");
        Ok(matched)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Direct-message history with `other`, newest first.
    pub fn private_history(
        &self,
        user_id: UserId,
        other: &str,
        page: Pagination,
    ) -> Result<Vec<Message>, ServerError> {
        let other_id = UserId::from_hex(other).map_err(|_| user_not_found())?;

        let db = self.lock()?;
        db.get_user(other_id).map_err(|e| or_not_found(e, user_not_found))?;
        if !db.are_friends(user_id, other_id)? {
            return Err(ServerError::Forbidden(
                "You are not friends with this user".into(),
            ));
        }
        Ok(db.private_history(user_id, other_id, page)?)
    }

    /// Group history, oldest first. Only members may read it.
    pub fn group_history(
        &self,
        user_id: UserId,
        group: &str,
        page: Pagination,
    ) -> Result<Vec<Message>, ServerError> {
        let group_id = GroupId::from_hex(group).map_err(|_| group_not_found())?;

        let db = self.lock()?;
        db.get_group(group_id).map_err(|e| or_not_found(e, group_not_found))?;
        if !db.is_group_member(group_id, user_id)? {
            return Err(ServerError::Forbidden(
                "You are not a member of this group".into(),
            ));
        }
        Ok(db.group_history(group_id, page)?)
    }
}

/// Profile embedded in push envelopes. A missing sender row degrades to an
/// id-only profile rather than failing the send.
fn sender_profile(db: &Database, sender_id: UserId) -> Result<SenderProfile, ServerError> {
    match db.get_user(sender_id) {
        Ok(user) => Ok(SenderProfile {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
        }),
        Err(StoreError::NotFound) => {
            warn!(sender = %sender_id, "Sender profile missing, pushing id only");
            Ok(SenderProfile {
                id: sender_id,
                username: String::new(),
                avatar: String::new(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn or_not_found(e: StoreError, not_found: fn() -> ServerError) -> ServerError {
    match e {
        StoreError::NotFound => not_found(),
        other => other.into(),
    }
}

fn receiver_not_found() -> ServerError {
    ServerError::NotFound("Receiver not found".into())
}

fn user_not_found() -> ServerError {
    ServerError::NotFound("User not found".into())
}

fn group_not_found() -> ServerError {
    ServerError::NotFound("Group not found".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use courier_shared::protocol::{Payload, PushMessage};
    use courier_shared::types::{FriendshipStatus, MemberRole, MessageId};
    use courier_store::NewGroup;

    use crate::hub::{Hub, LiveConnection};

    /// Records every push instead of writing to sockets.
    #[derive(Default)]
    struct RecordingDelivery {
        calls: Mutex<Vec<(UserId, Payload)>>,
    }

    impl RecordingDelivery {
        fn targets(&self) -> Vec<UserId> {
            self.calls.lock().unwrap().iter().map(|(u, _)| *u).collect()
        }
    }

    impl Deliver for RecordingDelivery {
        fn send_to_user(&self, user_id: UserId, payload: &Payload) {
            self.calls.lock().unwrap().push((user_id, payload.clone()));
        }
    }

    struct Fixture {
        db: SharedDatabase,
        delivery: Arc<RecordingDelivery>,
        router: MessageRouter,
    }

    impl Fixture {
        fn new() -> Self {
            let db: SharedDatabase =
                Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
            let delivery = Arc::new(RecordingDelivery::default());
            let router = MessageRouter::new(db.clone(), delivery.clone());
            Self {
                db,
                delivery,
                router,
            }
        }

        fn user(&self, name: &str) -> UserId {
            self.db.lock().unwrap().create_user(name, None).unwrap().id
        }

        fn befriend(&self, a: UserId, b: UserId) {
            let db = self.db.lock().unwrap();
            let edge = db.add_friendship(a, b).unwrap();
            db.set_friendship_status(edge.id, FriendshipStatus::Accepted)
                .unwrap();
        }

        fn message_count(&self) -> u64 {
            self.db.lock().unwrap().count_messages().unwrap()
        }
    }

    #[test]
    fn test_private_send_requires_friendship() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let c = fx.user("carol");

        let result = fx.router.send_private(a, &c.to_hex(), "hello");
        assert!(matches!(result, Err(ServerError::Forbidden(_))));
        assert_eq!(fx.message_count(), 0);
        assert!(fx.delivery.targets().is_empty());
    }

    #[test]
    fn test_pending_friendship_is_not_enough() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        fx.db.lock().unwrap().add_friendship(a, b).unwrap();

        let result = fx.router.send_private(a, &b.to_hex(), "hello");
        assert!(matches!(result, Err(ServerError::Forbidden(_))));
        assert_eq!(fx.message_count(), 0);
    }

    #[test]
    fn test_private_round_trip() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        // Stored as (b, a); must still authorize a -> b.
        fx.befriend(b, a);

        let sent = fx.router.send_private(a, &b.to_hex(), "hi").unwrap();
        assert!(!sent.read);

        let history = fx
            .router
            .private_history(b, &a.to_hex(), Pagination::default())
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[0].sender_id, a);
        assert_eq!(history[0].id, sent.id);

        assert_eq!(fx.delivery.targets(), vec![b]);
        let (_, payload) = fx.delivery.calls.lock().unwrap()[0].clone();
        let envelope: PushEnvelope = serde_json::from_str(&payload).unwrap();
        match envelope.data {
            PushMessage::Private(push) => {
                assert_eq!(push.from, a);
                assert_eq!(push.to, b);
                assert_eq!(push.sender.username, "alice");
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_private_send_unknown_receiver() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let gone = fx.user("gone");
        fx.befriend(a, gone);
        fx.db.lock().unwrap().soft_delete_user(gone).unwrap();

        for receiver in [gone.to_hex(), UserId::generate().to_hex(), "nope".into()] {
            let result = fx.router.send_private(a, &receiver, "hello");
            assert!(matches!(result, Err(ServerError::NotFound(_))), "{receiver}");
        }
        assert_eq!(fx.message_count(), 0);
    }

    #[test]
    fn test_empty_content_rejected_before_persisting() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        fx.befriend(a, b);

        let result = fx.router.send_private(a, &b.to_hex(), "");
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
        assert_eq!(fx.message_count(), 0);
    }

    fn group_with(fx: &Fixture, admin: UserId, members: &[UserId]) -> GroupId {
        let db = fx.db.lock().unwrap();
        let group = db
            .create_group(
                &NewGroup {
                    name: "crew".into(),
                    ..Default::default()
                },
                admin,
            )
            .unwrap();
        for member in members {
            db.add_group_member(group.id, *member, MemberRole::Member)
                .unwrap();
        }
        group.id
    }

    #[test]
    fn test_group_fan_out_skips_sender() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        let c = fx.user("carol");
        let group = group_with(&fx, a, &[b, c]);

        let sent = fx.router.send_group(a, &group.to_hex(), "hi").unwrap();
        assert_eq!(
            sent.target,
            MessageTarget::Group { group_id: group }
        );

        let mut targets = fx.delivery.targets();
        targets.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_group_send_requires_membership() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        let outsider = fx.user("mallory");
        let group = group_with(&fx, a, &[b]);

        let result = fx.router.send_group(outsider, &group.to_hex(), "hi");
        assert!(matches!(result, Err(ServerError::Forbidden(_))));

        fx.db.lock().unwrap().remove_group_member(group, b).unwrap();
        let result = fx.router.send_group(b, &group.to_hex(), "hi");
        assert!(matches!(result, Err(ServerError::Forbidden(_))));

        assert_eq!(fx.message_count(), 0);
        assert!(fx.delivery.targets().is_empty());
    }

    #[test]
    fn test_group_send_unknown_group() {
        let fx = Fixture::new();
        let a = fx.user("alice");

        for group in [GroupId::generate().to_hex(), "xyz".to_string()] {
            let result = fx.router.send_group(a, &group, "hi");
            assert!(matches!(result, Err(ServerError::NotFound(_))));
        }
    }

    #[test]
    fn test_group_history_oldest_first_and_members_only() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        let outsider = fx.user("mallory");
        let group = group_with(&fx, a, &[b]);

        let first = fx.router.send_group(a, &group.to_hex(), "1").unwrap();
        let second = fx.router.send_group(b, &group.to_hex(), "2").unwrap();

        let history = fx
            .router
            .group_history(b, &group.to_hex(), Pagination::default())
            .unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let denied = fx
            .router
            .group_history(outsider, &group.to_hex(), Pagination::default());
        assert!(matches!(denied, Err(ServerError::Forbidden(_))));
    }

    #[test]
    fn test_private_history_requires_friendship() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let c = fx.user("carol");

        let denied = fx
            .router
            .private_history(a, &c.to_hex(), Pagination::default());
        assert!(matches!(denied, Err(ServerError::Forbidden(_))));
    }

    #[test]
    fn test_mark_read_mixed_and_idempotent() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        fx.befriend(a, b);
        let m1 = fx.router.send_private(a, &b.to_hex(), "1").unwrap();
        let m2 = fx.router.send_private(a, &b.to_hex(), "2").unwrap();

        let ids = vec![m1.id.to_hex(), "not-a-hex".to_string(), m2.id.to_hex()];
        assert_eq!(fx.router.mark_read(&ids).unwrap(), 2);
        assert_eq!(fx.router.mark_read(&ids).unwrap(), 2);

        let db = fx.db.lock().unwrap();
        assert!(db.get_message(m1.id).unwrap().read);
        assert!(db.get_message(m2.id).unwrap().read);
    }

    #[test]
    fn test_mark_read_large_batch() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        let b = fx.user("bob");
        fx.befriend(a, b);
        let sent = fx.router.send_private(a, &b.to_hex(), "1").unwrap();

        let mut ids: Vec<String> = (0..40_000)
            .map(|_| MessageId::generate().to_hex())
            .collect();
        ids.push(sent.id.to_hex());

        assert_eq!(fx.router.mark_read(&ids).unwrap(), 1);
        assert!(fx.db.lock().unwrap().get_message(sent.id).unwrap().read);
    }

    #[test]
    fn test_mark_read_all_malformed() {
        let fx = Fixture::new();
        let result = fx.router.mark_read(&["not-a-hex"]);
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn test_delivery_through_real_hub() {
        let db: SharedDatabase = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let hub = Arc::new(Hub::new());
        let router = MessageRouter::new(db.clone(), hub.clone());

        let (a, b) = {
            let db = db.lock().unwrap();
            let a = db.create_user("alice", None).unwrap().id;
            let b = db.create_user("bob", None).unwrap().id;
            let edge = db.add_friendship(a, b).unwrap();
            db.set_friendship_status(edge.id, FriendshipStatus::Accepted)
                .unwrap();
            (a, b)
        };

        let (conn, mut rx) = LiveConnection::channel(4);
        hub.register(b, conn);

        router.send_private(a, &b.to_hex(), "hello").unwrap();

        let payload = rx.try_recv().unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["data"]["type"], "private");
        assert_eq!(json["data"]["message"]["content"], "hello");
        assert!(rx.try_recv().is_err());
    }
}
