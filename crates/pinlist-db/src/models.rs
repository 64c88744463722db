//! Column lists and row mappers for each table.
//!
//! Every mapper expects the columns in the order of the matching `*_COLUMNS`
//! constant, so queries select with the constant rather than `*`.

use pinlist_types::models::{List, ListMember, ListRole, Pin, Tag, Token, User, UserStatus};
use rusqlite::Row;
use rusqlite::types::Type;

pub(crate) const USER_COLUMNS: &str = "u.id, u.status, u.username, u.email, u.password, u.created_at";

pub(crate) const TOKEN_COLUMNS: &str = "t.id, t.hash, t.until, t.created_at, t.user_id";

pub(crate) const LIST_COLUMNS: &str = "l.id, l.name, l.description, l.public, l.pins";

pub(crate) const PIN_COLUMNS: &str =
    "p.id, p.title, p.url, p.creator_id, u.username, p.list_id, p.created_at";

pub(crate) fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let raw: u8 = row.get(1)?;
    let status = UserStatus::from_byte(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Integer,
            format!("unknown user status {raw}").into(),
        )
    })?;

    Ok(User {
        id: row.get(0)?,
        status,
        username: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) fn token_from_row(row: &Row) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        hash: row.get(1)?,
        until: row.get(2)?,
        created_at: row.get(3)?,
        user_id: row.get(4)?,
    })
}

pub(crate) fn list_from_row(row: &Row) -> rusqlite::Result<List> {
    Ok(List {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        public: row.get(3)?,
        pins: row.get(4)?,
        users: Vec::new(),
    })
}

pub(crate) fn member_from_row(row: &Row) -> rusqlite::Result<ListMember> {
    Ok(ListMember {
        user_id: row.get(0)?,
        username: row.get(1)?,
        role: ListRole::from_bits(row.get(2)?),
    })
}

/// Tags are loaded separately and attached by the caller.
pub(crate) fn pin_from_row(row: &Row) -> rusqlite::Result<Pin> {
    Ok(Pin {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        creator_id: row.get(3)?,
        creator: row.get(4)?,
        list_id: row.get(5)?,
        created_at: row.get(6)?,
        tags: Vec::new(),
    })
}

pub(crate) fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        pin_id: row.get(1)?,
        name: row.get(2)?,
    })
}
