//! Domain enums and small value types.
//!
//! Every enum here is stored as lowercase text in SQLite and travels as the
//! same lowercase string over JSON, so `as_str` and `FromStr` are the single
//! source of truth for both directions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// Whether a profile shows up in the public user directory.
    #[derive(Default)]
    AccountMode as "account mode" {
        #[default]
        Public => "public",
        Private => "private",
    }
}

text_enum! {
    #[derive(Default)]
    OnlineStatus as "online status" {
        Online => "online",
        #[default]
        Offline => "offline",
    }
}

text_enum! {
    /// Stored state of a friendship record.
    FriendshipStatus as "friendship status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

text_enum! {
    /// How another user relates to the viewer.
    #[derive(Default)]
    Relation as "relation" {
        #[default]
        None => "none",
        Sent => "sent",
        Received => "received",
        Friends => "friends",
    }
}

text_enum! {
    /// Who may see a post in their feed.
    #[derive(Default)]
    Visibility as "visibility" {
        #[default]
        Public => "public",
        Friends => "friends",
    }
}

text_enum! {
    #[derive(Default)]
    MessageKind as "message type" {
        #[default]
        Text => "text",
        Image => "image",
        Audio => "audio",
        Emoji => "emoji",
    }
}

impl Relation {
    /// Derive the viewer-relative relation from a stored friendship record.
    ///
    /// `requester_is_viewer` tells which side of the record the viewer sits on.
    /// Rejected records read as no relation at all.
    pub fn from_record(status: FriendshipStatus, requester_is_viewer: bool) -> Self {
        match status {
            FriendshipStatus::Accepted => Relation::Friends,
            FriendshipStatus::Pending if requester_is_viewer => Relation::Sent,
            FriendshipStatus::Pending => Relation::Received,
            FriendshipStatus::Rejected => Relation::None,
        }
    }
}

pub const DEFAULT_PRIMARY_COLOR: &str = "#6366f1";
pub const DEFAULT_SECONDARY_COLOR: &str = "#8b5cf6";
pub const DEFAULT_TERTIARY_COLOR: &str = "#ec4899";

/// Per-user profile theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary: DEFAULT_SECONDARY_COLOR.to_string(),
            tertiary: DEFAULT_TERTIARY_COLOR.to_string(),
        }
    }
}

impl ThemeColors {
    /// Overlay any provided colors on top of the current theme.
    pub fn merged(
        &self,
        primary: Option<String>,
        secondary: Option<String>,
        tertiary: Option<String>,
    ) -> Self {
        Self {
            primary: primary.unwrap_or_else(|| self.primary.clone()),
            secondary: secondary.unwrap_or_else(|| self.secondary.clone()),
            tertiary: tertiary.unwrap_or_else(|| self.tertiary.clone()),
        }
    }
}
