use std::sync::Arc;

/// Which report table an entry belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Step,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub category: Category,
    /// Step type label (`request`, `api`, ...); `transaction` for transactions.
    pub kind: Arc<str>,
    pub name: Arc<str>,
}

impl EntryKey {
    #[must_use]
    pub fn step(kind: &str, name: &str) -> Self {
        Self {
            category: Category::Step,
            kind: Arc::from(kind),
            name: Arc::from(name),
        }
    }

    #[must_use]
    pub fn transaction(name: &str) -> Self {
        Self {
            category: Category::Transaction,
            kind: Arc::from("transaction"),
            name: Arc::from(name),
        }
    }
}
