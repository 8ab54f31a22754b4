use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use crate::model::GLOBAL_REPORTS_KEY;
use crate::recording::RecordingBuffer;
use crate::session::SessionStore;

/// Process-wide shared bag plugins use to communicate across sessions.
/// The core treats the contents as opaque except for the reserved
/// `"reports"` sub-map, which it exposes a typed accessor for; plugins
/// are responsible for their own synchronization beyond the single
/// `RwLock` this type uses to let the core hand out references safely
/// across the async plugin boundary (`spec.md` §5).
#[derive(Default)]
pub struct GlobalData {
    values: RwLock<HashMap<String, JsonValue>>,
}

impl GlobalData {
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.read().expect("global data poisoned").get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: JsonValue) {
        self.values
            .write()
            .expect("global data poisoned")
            .insert(key.into(), value);
    }

    /// Last-writer-wins update of one plugin's entry under the reserved
    /// `reports` sub-map.
    pub fn set_report(&self, plugin_name: &str, report: JsonValue) {
        let mut values = self.values.write().expect("global data poisoned");
        let reports = values
            .entry(GLOBAL_REPORTS_KEY.to_string())
            .or_insert_with(|| JsonValue::Object(Default::default()));
        if let JsonValue::Object(map) = reports {
            map.insert(plugin_name.to_string(), report);
        }
    }

    pub fn reports(&self) -> JsonValue {
        self.get(GLOBAL_REPORTS_KEY).unwrap_or_else(|| JsonValue::Object(Default::default()))
    }
}

/// Aggregates the process-wide collaborators the engine and plugins
/// share: the session store, the recording buffer, and `GlobalData`.
pub struct ProxyState {
    pub sessions: SessionStore,
    pub recording: RecordingBuffer,
    pub global: GlobalData,
}

impl ProxyState {
    pub fn new() -> Self {
        Self {
            sessions: SessionStore::new(),
            recording: RecordingBuffer::new(),
            global: GlobalData::default(),
        }
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_last_writer_wins_per_plugin() {
        let global = GlobalData::default();
        global.set_report("plugin-a", JsonValue::from(1));
        global.set_report("plugin-a", JsonValue::from(2));
        global.set_report("plugin-b", JsonValue::from("x"));
        let reports = global.reports();
        assert_eq!(reports["plugin-a"], JsonValue::from(2));
        assert_eq!(reports["plugin-b"], JsonValue::from("x"));
    }
}
