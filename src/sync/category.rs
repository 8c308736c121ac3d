use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::watch;

/// One of the three independent channel namespaces served by the proxy.
///
/// Every category owns its own snapshot and dashboard slot; nothing is shared
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Messages,
    Responses,
    Gemini,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Messages, Category::Responses, Category::Gemini];

    /// Wire name, also the first path segment of the category's admin routes.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Messages => "messages",
            Category::Responses => "responses",
            Category::Gemini => "gemini",
        }
    }

    /// Position of this category's slot in per-category arrays.
    pub(crate) fn slot(self) -> usize {
        match self {
            Category::Messages => 0,
            Category::Responses => 1,
            Category::Gemini => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown channel category '{0}' (expected messages, responses or gemini)")]
pub struct CategoryParseError(pub String);

impl FromStr for Category {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messages" => Ok(Category::Messages),
            "responses" => Ok(Category::Responses),
            "gemini" => Ok(Category::Gemini),
            other => Err(CategoryParseError(other.to_string())),
        }
    }
}

/// Map a navigation route to the category it selects.
///
/// Recognized routes:
/// - `/channels/<category>`
/// - `/monitor?type=<category>` (first `type` value wins)
///
/// Anything else, including a recognized route carrying an unknown category,
/// returns `None` so the current selection is left untouched.
pub fn category_from_route(route: &str) -> Option<Category> {
    let (path, query) = match route.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (route, None),
    };

    if let Some(rest) = path.strip_prefix("/channels/") {
        let segment = rest.strip_suffix('/').unwrap_or(rest);
        if segment.contains('/') {
            return None;
        }
        return segment.parse().ok();
    }

    if path == "/monitor" || path == "/monitor/" {
        let query = query?;
        let value = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "type")
            .map(|(_, value)| value)?;
        return value.parse().ok();
    }

    None
}

/// Holds the active category and follows navigation signals.
///
/// Backed by a `watch` channel so readers never block and subscribers only
/// wake on an actual change.
#[derive(Debug)]
pub struct CategorySelector {
    tx: watch::Sender<Category>,
}

impl CategorySelector {
    pub fn new(initial: Category) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Category {
        *self.tx.borrow()
    }

    /// Switch to `category`. Returns true when the selection changed.
    pub fn select(&self, category: Category) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == category {
                false
            } else {
                *current = category;
                true
            }
        })
    }

    /// Apply a navigation route. Returns the new category when it changed.
    pub fn navigate(&self, route: &str) -> Option<Category> {
        let category = category_from_route(route)?;
        self.select(category).then_some(category)
    }

    pub fn subscribe(&self) -> watch::Receiver<Category> {
        self.tx.subscribe()
    }
}
