//! Cursor based pagination over reference sequences.
//!
//! A cursor is either absent (start from the head), the id of the element to
//! resume from, or the terminal `"end"` sentinel. Chaining the returned
//! cursors visits every element exactly once and always terminates at
//! [`Cursor::End`].

use std::fmt::{self, Display};

use serde::{Serialize, Serializer};

const END: &str = "end";

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cursor<I> {
    Start,
    At(I),
    End,
}

impl<I: From<String>> From<Option<String>> for Cursor<I> {
    fn from(raw: Option<String>) -> Self {
        match raw {
            None => Self::Start,
            Some(s) if s.is_empty() => Self::Start,
            Some(s) if s == END => Self::End,
            Some(s) => Self::At(I::from(s)),
        }
    }
}

impl<I: Display> Display for Cursor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, ""),
            Self::At(id) => write!(f, "{id}"),
            Self::End => write!(f, "{END}"),
        }
    }
}

impl<I: Display> Serialize for Cursor<I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Start => serializer.serialize_none(),
            other => serializer.collect_str(other),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T, I: Display> {
    pub items: Vec<T>,
    pub next: Cursor<I>,
}

impl<T, I: Display> Page<T, I> {
    pub fn end() -> Self {
        Self {
            items: vec![],
            next: Cursor::End,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("cursor not found: {0}")]
    CursorNotFound(String),
}

/// Index of the first element to return for `cursor`, `items.len()` for the end sentinel.
pub fn start_index<T, I>(items: &[T], cursor: &Cursor<I>, id_of: impl Fn(&T) -> &I) -> Result<usize>
where
    I: PartialEq + Display,
{
    match cursor {
        Cursor::Start => Ok(0),
        Cursor::End => Ok(items.len()),
        Cursor::At(id) => items
            .iter()
            .position(|item| id_of(item) == id)
            .ok_or_else(|| Error::CursorNotFound(id.to_string())),
    }
}

/// Count-bounded page: up to `limit` items starting at the cursor.
pub fn by_count<T, I>(
    items: &[T],
    cursor: &Cursor<I>,
    limit: usize,
    id_of: impl Fn(&T) -> &I,
) -> Result<Page<T, I>>
where
    T: Clone,
    I: PartialEq + Clone + Display,
{
    let start = start_index(items, cursor, &id_of)?;
    if start >= items.len() {
        return Ok(Page::end());
    }

    let end = (start + limit.max(1)).min(items.len());
    let next = items
        .get(end)
        .map(|item| Cursor::At(id_of(item).clone()))
        .unwrap_or(Cursor::End);

    Ok(Page {
        items: items[start..end].to_vec(),
        next,
    })
}
