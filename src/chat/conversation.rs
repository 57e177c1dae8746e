use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Set-once holder for the backend-assigned conversation id.
///
/// The first successful [`try_set`](Self::try_set) wins; later ids are rejected
/// until [`clear`](Self::clear) starts a new conversation.
#[derive(Debug, Default)]
pub struct ConversationCell {
    id: ArcSwapOption<String>,
}

impl ConversationCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `id` if no id is held. Returns `true` when this call stored it.
    pub fn try_set(&self, id: impl Into<String>) -> bool {
        let candidate = Some(Arc::new(id.into()));
        let previous = self.id.compare_and_swap(&None::<Arc<String>>, candidate);
        previous.is_none()
    }

    pub fn get(&self) -> Option<String> {
        self.id.load_full().map(|id| id.as_ref().clone())
    }

    #[cfg(test)]
    fn is_set(&self) -> bool {
        self.id.load().is_some()
    }

    pub fn clear(&self) {
        self.id.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let cell = ConversationCell::new();
        assert!(!cell.is_set());

        assert!(cell.try_set("abc123"));
        assert!(!cell.try_set("zzz999"));
        assert_eq!(cell.get().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_clear_allows_new_id() {
        let cell = ConversationCell::new();
        cell.try_set("first");
        cell.clear();

        assert_eq!(cell.get(), None);
        assert!(cell.try_set("second"));
        assert_eq!(cell.get().as_deref(), Some("second"));
    }

    #[test]
    fn test_concurrent_writers_store_exactly_one() {
        let cell = Arc::new(ConversationCell::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cell = cell.clone();
                std::thread::spawn(move || cell.try_set(format!("conv-{i}")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|stored| *stored)
            .count();
        assert_eq!(winners, 1);
        assert!(cell.is_set());
    }
}
