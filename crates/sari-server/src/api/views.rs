//! JSON shapes returned by the HTTP API.
//!
//! Storage records carry secrets and raw foreign keys; these views are what
//! clients actually see, with referenced users expanded to summaries.

use serde::Serialize;

use sari_core::model::{
    AccountMode, FriendshipStatus, MessageKind, OnlineStatus, Relation, ThemeColors, Visibility,
};

use crate::storage::{
    ChatRecord, CommentRecord, FriendshipRecord, MessageRecord, PostRecord, SeenReceipt, UserRecord,
};

/// The minimal public face of a user, embedded wherever another record
/// points at one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub online_status: OnlineStatus,
    pub last_seen: u64,
}

impl UserSummary {
    /// Placeholder for a reference whose user row is gone.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            profile_picture: String::new(),
            online_status: OnlineStatus::Offline,
            last_seen: 0,
        }
    }
}

impl From<&UserRecord> for UserSummary {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            profile_picture: u.profile_picture.clone(),
            online_status: u.online_status,
            last_seen: u.last_seen,
        }
    }
}

/// `user` in the verify-otp response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_picture: String,
}

impl From<&UserRecord> for SignupUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            profile_picture: u.profile_picture.clone(),
        }
    }
}

/// `user` in the login response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub account_mode: AccountMode,
    pub theme_colors: ThemeColors,
}

impl From<&UserRecord> for LoginUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            profile_picture: u.profile_picture.clone(),
            bio: u.bio.clone(),
            account_mode: u.account_mode,
            theme_colors: u.theme.clone(),
        }
    }
}

/// Everything the owner may see about their own account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub account_mode: AccountMode,
    pub theme_colors: ThemeColors,
    pub email_verified: bool,
    pub online_status: OnlineStatus,
    pub last_seen: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<&UserRecord> for PrivateProfile {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            profile_picture: u.profile_picture.clone(),
            bio: u.bio.clone(),
            account_mode: u.account_mode,
            theme_colors: u.theme.clone(),
            email_verified: u.email_verified,
            online_status: u.online_status,
            last_seen: u.last_seen,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Another user's profile as seen by the viewer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub bio: String,
    pub account_mode: AccountMode,
    pub theme_colors: ThemeColors,
    pub online_status: OnlineStatus,
    pub last_seen: u64,
    pub created_at: u64,
    pub friendship_status: Relation,
}

impl PublicProfile {
    pub fn new(u: &UserRecord, friendship_status: Relation) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            profile_picture: u.profile_picture.clone(),
            bio: u.bio.clone(),
            account_mode: u.account_mode,
            theme_colors: u.theme.clone(),
            online_status: u.online_status,
            last_seen: u.last_seen,
            created_at: u.created_at,
            friendship_status,
        }
    }
}

/// A search or directory hit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    #[serde(flatten)]
    pub user: UserSummary,
    pub bio: String,
    pub account_mode: AccountMode,
    pub friendship_status: Relation,
}

impl DirectoryEntry {
    pub fn new(u: &UserRecord, friendship_status: Relation) -> Self {
        Self {
            user: UserSummary::from(u),
            bio: u.bio.clone(),
            account_mode: u.account_mode,
            friendship_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipView {
    pub id: String,
    pub requester: UserSummary,
    pub recipient: UserSummary,
    pub status: FriendshipStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl FriendshipView {
    pub fn new(f: &FriendshipRecord, requester: UserSummary, recipient: UserSummary) -> Self {
        Self {
            id: f.id.clone(),
            requester,
            recipient,
            status: f.status,
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingRequests {
    pub sent: Vec<FriendshipView>,
    pub received: Vec<FriendshipView>,
}

/// An accepted friend, with the record id so the client can refer to it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    #[serde(flatten)]
    pub user: UserSummary,
    pub bio: String,
    pub friendship_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub user: UserSummary,
    pub text: String,
    pub created_at: u64,
}

impl CommentView {
    pub fn new(c: &CommentRecord, user: UserSummary) -> Self {
        Self {
            id: c.id.clone(),
            post_id: c.post_id.clone(),
            user,
            text: c.text.clone(),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub user: UserSummary,
    pub caption: String,
    pub image: String,
    pub visibility: Visibility,
    pub likes: Vec<UserSummary>,
    pub comments: Vec<CommentView>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PostView {
    pub fn new(
        p: &PostRecord,
        user: UserSummary,
        likes: Vec<UserSummary>,
        comments: Vec<CommentView>,
    ) -> Self {
        Self {
            id: p.id.clone(),
            user,
            caption: p.caption.clone(),
            image: p.image.clone(),
            visibility: p.visibility,
            likes,
            comments,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenView {
    pub user_id: String,
    pub seen_at: u64,
}

impl From<&SeenReceipt> for SeenView {
    fn from(r: &SeenReceipt) -> Self {
        Self {
            user_id: r.user_id.clone(),
            seen_at: r.seen_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub sender: UserSummary,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub media_url: String,
    pub seen_by: Vec<SeenView>,
    pub created_at: u64,
}

impl MessageView {
    pub fn new(m: &MessageRecord, sender: UserSummary) -> Self {
        Self {
            id: m.id.clone(),
            chat_id: m.chat_id.clone(),
            sender,
            content: m.content.clone(),
            kind: m.kind,
            media_url: m.media_url.clone(),
            seen_by: m.seen_by.iter().map(SeenView::from).collect(),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: String,
    pub participants: Vec<UserSummary>,
    pub last_message_at: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ChatView {
    pub fn new(c: &ChatRecord, participants: Vec<UserSummary>) -> Self {
        Self {
            id: c.id.clone(),
            participants,
            last_message_at: c.last_message_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// A chat in the caller's chat list, with read-state flags computed for
/// the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    #[serde(flatten)]
    pub chat: ChatView,
    pub last_message: Option<MessageView>,
    pub last_message_from_current_user: bool,
    pub last_message_seen_by_other: bool,
    pub has_unread_for_current_user: bool,
}

/// Read-state flags for the caller, given the chat's last message.
/// Returns `(from_current_user, seen_by_other, unread_for_current_user)`.
pub fn read_flags(last: Option<&MessageRecord>, me: &str, other: &str) -> (bool, bool, bool) {
    let Some(last) = last else {
        return (false, false, false);
    };
    let from_me = last.sender_id == me;
    let seen_by_other = from_me && last.seen_by_user(other);
    let unread = !from_me && !last.seen_by_user(me);
    (from_me, seen_by_other, unread)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, seen: &[&str]) -> MessageRecord {
        MessageRecord {
            id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: sender.into(),
            content: "hi".into(),
            kind: MessageKind::Text,
            media_url: String::new(),
            created_at: 1,
            updated_at: 1,
            seen_by: seen
                .iter()
                .map(|u| SeenReceipt { user_id: u.to_string(), seen_at: 2 })
                .collect(),
        }
    }

    #[test]
    fn no_last_message_means_no_flags() {
        assert_eq!(read_flags(None, "a", "b"), (false, false, false));
    }

    #[test]
    fn own_message_tracks_other_side() {
        assert_eq!(read_flags(Some(&message("a", &[])), "a", "b"), (true, false, false));
        assert_eq!(read_flags(Some(&message("a", &["b"])), "a", "b"), (true, true, false));
    }

    #[test]
    fn incoming_message_unread_until_seen() {
        assert_eq!(read_flags(Some(&message("b", &[])), "a", "b"), (false, false, true));
        assert_eq!(read_flags(Some(&message("b", &["a"])), "a", "b"), (false, false, false));
    }

    #[test]
    fn message_kind_serialized_as_type() {
        let view = MessageView::new(&message("a", &["b"]), UserSummary::unknown("a"));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["seenBy"][0]["userId"], "b");
        assert_eq!(json["sender"]["id"], "a");
    }
}
