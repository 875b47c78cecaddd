use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::waste::{ClassificationOutput, WasteCategory};

/// One completed classification as kept in the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    pub category: WasteCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycling_tips: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ClassificationResult {
    /// A result with no id or timestamp yet; `HistoryStore::add` fills both.
    pub fn unstamped(category: WasteCategory) -> Self {
        Self {
            id: String::new(),
            item_name: None,
            category,
            recycling_tips: None,
            timestamp: 0,
        }
    }

    pub fn stamped(output: ClassificationOutput) -> Self {
        let mut result = Self::from(output);
        result.stamp();
        result
    }

    pub fn is_stamped(&self) -> bool {
        !self.id.is_empty() && self.timestamp > 0
    }

    fn stamp(&mut self) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        if self.timestamp <= 0 {
            self.timestamp = Utc::now().timestamp_millis();
        }
    }

    pub fn label(&self) -> String {
        match self.item_name.as_deref() {
            Some(name) => format!("{name} is {}.", self.category),
            None => format!("Item is {}.", self.category),
        }
    }
}

impl From<ClassificationOutput> for ClassificationResult {
    fn from(output: ClassificationOutput) -> Self {
        Self {
            id: String::new(),
            item_name: Some(output.item_name),
            category: output.category,
            recycling_tips: output.recycling_tips,
            timestamp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    Added(ClassificationResult),
    Cleared { removed: usize },
}

impl HistoryEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "classification_added",
            Self::Cleared { .. } => "history_cleared",
        }
    }

    /// Short acknowledgement for the user, title plus optional body.
    pub fn notice(&self) -> (String, Option<String>) {
        match self {
            Self::Added(result) => ("Item Classified!".to_string(), Some(result.label())),
            Self::Cleared { .. } => ("History Cleared".to_string(), None),
        }
    }
}

pub trait HistoryObserver {
    fn notify(&self, event: &HistoryEvent);
}

/// Session-scoped classification history, newest entry first.
///
/// Unbounded; the session owns it and hands out read-only snapshots.
#[derive(Default)]
pub struct HistoryStore {
    entries: Vec<ClassificationResult>,
    observers: Vec<Box<dyn HistoryObserver>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O: HistoryObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn add(&mut self, mut result: ClassificationResult) -> &ClassificationResult {
        result.stamp();
        if let Some(head) = self.entries.first() {
            result.timestamp = result.timestamp.max(head.timestamp);
        }
        self.entries.insert(0, result.clone());
        self.publish(&HistoryEvent::Added(result));
        &self.entries[0]
    }

    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.publish(&HistoryEvent::Cleared { removed });
    }

    pub fn snapshot(&self) -> &[ClassificationResult] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&ClassificationResult> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category labels in scan order, the input the summary flow expects.
    pub fn categories_oldest_first(&self) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .map(|entry| entry.category.as_str().to_string())
            .collect()
    }

    fn publish(&self, event: &HistoryEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("entries", &self.entries)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{ClassificationResult, HistoryEvent, HistoryObserver, HistoryStore};
    use crate::waste::{ClassificationOutput, WasteCategory};

    struct Recorder(Rc<RefCell<Vec<HistoryEvent>>>);

    impl HistoryObserver for Recorder {
        fn notify(&self, event: &HistoryEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    fn named(name: &str, category: WasteCategory) -> ClassificationResult {
        let mut result = ClassificationResult::unstamped(category);
        result.item_name = Some(name.to_string());
        result
    }

    #[test]
    fn snapshot_is_newest_first() {
        let mut store = HistoryStore::new();
        let names = ["bottle", "peel", "battery", "can", "tea bag"];
        for name in names {
            store.add(named(name, WasteCategory::Recyclable));
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), names.len());
        assert_eq!(snapshot[0].item_name.as_deref(), Some("tea bag"));
        assert_eq!(snapshot[4].item_name.as_deref(), Some("bottle"));
    }

    #[test]
    fn add_stamps_unique_ids_and_non_decreasing_timestamps() {
        let mut store = HistoryStore::new();
        let mut future = named("first", WasteCategory::Biodegradable);
        future.timestamp = i64::MAX / 2;
        store.add(future);
        store.add(named("second", WasteCategory::Recyclable));

        let snapshot = store.snapshot();
        assert!(snapshot.iter().all(ClassificationResult::is_stamped));
        assert_ne!(snapshot[0].id, snapshot[1].id);
        assert!(snapshot[0].timestamp >= snapshot[1].timestamp);
    }

    #[test]
    fn add_keeps_existing_id_and_timestamp() {
        let mut store = HistoryStore::new();
        let mut entry = named("jar", WasteCategory::Recyclable);
        entry.id = "fixed-id".to_string();
        entry.timestamp = 1_700_000_000_000;
        let stored = store.add(entry).clone();
        assert_eq!(stored.id, "fixed-id");
        assert_eq!(stored.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn clear_empties_regardless_of_contents() {
        let mut store = HistoryStore::new();
        store.clear();
        assert!(store.snapshot().is_empty());
        for _ in 0..3 {
            store.add(ClassificationResult::unstamped(WasteCategory::DomesticHazardous));
        }
        store.clear();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.latest(), None);
    }

    #[test]
    fn observers_receive_add_and_clear() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut store = HistoryStore::new();
        store.subscribe(Recorder(events.clone()));

        store.add(ClassificationResult::stamped(ClassificationOutput {
            item_name: "Apple core".to_string(),
            category: WasteCategory::Biodegradable,
            recycling_tips: Some("Compost it".to_string()),
        }));
        store.clear();

        let seen = events.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_type(), "classification_added");
        assert_eq!(
            seen[0].notice(),
            (
                "Item Classified!".to_string(),
                Some("Apple core is Biodegradable.".to_string())
            )
        );
        assert_eq!(seen[1], HistoryEvent::Cleared { removed: 1 });
    }

    #[test]
    fn categories_oldest_first_reverses_history() {
        let mut store = HistoryStore::new();
        store.add(ClassificationResult::unstamped(WasteCategory::Recyclable));
        store.add(ClassificationResult::unstamped(WasteCategory::Biodegradable));
        assert_eq!(
            store.categories_oldest_first(),
            vec!["Recyclable".to_string(), "Biodegradable".to_string()]
        );
    }
}
