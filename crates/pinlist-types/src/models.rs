use std::fmt;
use std::ops::BitOr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// How long a freshly issued session token stays valid.
pub const TOKEN_LIFETIME_DAYS: i64 = 365;

// -- Users --

/// Account status. Persisted as a single-bit byte, but only one status ever
/// applies to an account at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Waiting,
    Active,
    Suspended,
    Inactive,
}

impl UserStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Waiting => 1,
            Self::Active => 2,
            Self::Suspended => 4,
            Self::Inactive => 8,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Waiting),
            2 => Some(Self::Active),
            4 => Some(Self::Suspended),
            8 => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub status: UserStatus,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

// -- Tokens --

/// Opaque bearer credential. Only `hash` and `until` ever leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(skip_serializing)]
    pub id: i64,
    pub hash: String,
    pub until: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub user_id: i64,
}

impl Token {
    /// Builds an unsaved token for `user_id`, expiring a year from now.
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            hash: Uuid::new_v4().to_string(),
            until: now + Duration::days(TOKEN_LIFETIME_DAYS),
            created_at: now,
            user_id,
        }
    }
}

// -- Lists --

/// Permission bits a user holds on a list. Unlike [`UserStatus`] these are
/// real flags and may be combined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ListRole(u8);

impl ListRole {
    /// Full control over the list.
    pub const OWNER: ListRole = ListRole(1);
    /// May add pins to the list.
    pub const ADDER: ListRole = ListRole(1 << 1);
    /// May see the list.
    pub const GUEST: ListRole = ListRole(1 << 2);

    const ALL: u8 = 0b111;

    pub fn from_bits(bits: u8) -> Self {
        ListRole(bits & Self::ALL)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: ListRole) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for ListRole {
    type Output = ListRole;

    fn bitor(self, rhs: ListRole) -> ListRole {
        ListRole(self.0 | rhs.0)
    }
}

impl fmt::Debug for ListRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::OWNER) {
            names.push("OWNER");
        }
        if self.contains(Self::ADDER) {
            names.push("ADDER");
        }
        if self.contains(Self::GUEST) {
            names.push("GUEST");
        }
        write!(f, "ListRole({})", names.join(" | "))
    }
}

impl Serialize for ListRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// A user's membership on a list, as shown on list detail pages.
#[derive(Debug, Clone, Serialize)]
pub struct ListMember {
    pub user_id: i64,
    pub username: String,
    pub role: ListRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct List {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub pins: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<ListMember>,
}

// -- Pins & tags --

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    #[serde(skip_serializing)]
    pub pin_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pin {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub creator_id: i64,
    pub creator: Option<String>,
    pub list_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

/// A pin that has not been written yet. Tags are already normalized.
#[derive(Debug, Clone)]
pub struct NewPin {
    pub title: String,
    pub url: String,
    pub creator_id: i64,
    pub list_id: Option<i64>,
    pub tags: Vec<String>,
}

impl NewPin {
    pub fn new(
        creator_id: i64,
        title: impl Into<String>,
        url: impl Into<String>,
        tags: &[String],
        list_id: Option<i64>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            creator_id,
            list_id,
            tags: dedup_tags(tags),
        }
    }
}

/// Trims and lowercases tag names, dropping empties and repeats while
/// keeping the order in which names were first seen.
pub fn dedup_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for raw in tags {
        let name = raw.as_ref().trim().to_lowercase();
        if name.is_empty() || out.contains(&name) {
            continue;
        }
        out.push(name);
    }
    out
}

/// Number of visible pins carrying a given tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

// -- Collections --

/// Envelope for every paginated collection.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub total: i64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self {
            count: items.len(),
            total,
            items,
        }
    }
}
