use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(GroupId);
id_newtype!(MessageId);

/// Identity of a conversation: a group channel or a direct thread with a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationRef {
    Group(GroupId),
    Direct(String),
}

impl ConversationRef {
    pub fn group(group_id: i64) -> Self {
        Self::Group(GroupId(group_id))
    }

    pub fn direct(username: impl Into<String>) -> Self {
        Self::Direct(username.into())
    }

    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Group(group_id) => Some(*group_id),
            Self::Direct(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(group_id) => write!(f, "group:{group_id}"),
            Self::Direct(username) => write!(f, "dm:{username}"),
        }
    }
}

/// Membership of the current user in a group, as far as the client knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    Member,
    NotMember,
    #[default]
    Unknown,
}

impl Membership {
    pub fn from_flag(is_member: Option<bool>) -> Self {
        match is_member {
            Some(true) => Self::Member,
            Some(false) => Self::NotMember,
            None => Self::Unknown,
        }
    }
}
