use std::{collections::HashMap, sync::RwLock};

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;

use crate::capture::TimerUsageSummary;

/// Slot the results view reads.
pub const RESULT_SLOT: &str = "avatarResult";

/// Named JSON slots shared between the submission flow and the results view.
/// Values are stored serialized and read back verbatim.
#[derive(Default)]
pub struct ResultHandoff {
    slots: RwLock<HashMap<String, String>>,
}

impl ResultHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a server result, tagged with the client-side timer analytics.
    pub fn store_result(&self, mut result: Value, analytics: &TimerUsageSummary) -> Result<Value> {
        if let Value::Object(map) = &mut result {
            map.insert("client_timer_analytics".into(), serde_json::to_value(analytics)?);
            map.insert("stored_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        self.put(RESULT_SLOT, serde_json::to_string(&result)?)?;
        Ok(result)
    }

    pub fn result(&self) -> Result<Option<Value>> {
        match self.get(RESULT_SLOT)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, slot: &str, raw: String) -> Result<()> {
        self.slots
            .write()
            .map_err(|_| anyhow!("handoff lock poisoned"))?
            .insert(slot.to_string(), raw);
        Ok(())
    }

    pub fn get(&self, slot: &str) -> Result<Option<String>> {
        Ok(self
            .slots
            .read()
            .map_err(|_| anyhow!("handoff lock poisoned"))?
            .get(slot)
            .cloned())
    }

    pub fn clear(&self, slot: &str) -> Result<bool> {
        Ok(self
            .slots
            .write()
            .map_err(|_| anyhow!("handoff lock poisoned"))?
            .remove(slot)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::analytics::TimerConsistency;
    use std::collections::BTreeMap;

    fn summary() -> TimerUsageSummary {
        TimerUsageSummary {
            timers_used: vec![5, 10],
            average_timer: Some(7.5),
            timer_distribution: BTreeMap::from([("5s".into(), 1), ("10s".into(), 1)]),
            timer_consistency: TimerConsistency::Mixed,
            retake_count: 0,
            timer_cancellation_count: 1,
            total_session_ms: 1000,
        }
    }

    #[test]
    fn stored_result_reads_back_with_analytics() {
        let handoff = ResultHandoff::new();
        assert!(handoff.result().unwrap().is_none());

        let stored = handoff
            .store_result(serde_json::json!({"success": true, "bmi": 22.9}), &summary())
            .unwrap();
        let read = handoff.result().unwrap().unwrap();

        assert_eq!(read, stored);
        assert_eq!(read["bmi"], 22.9);
        assert_eq!(read["client_timer_analytics"]["averageTimer"], 7.5);
        assert_eq!(read["client_timer_analytics"]["timerConsistency"], "mixed");
    }

    #[test]
    fn newer_result_replaces_slot() {
        let handoff = ResultHandoff::new();
        handoff.store_result(serde_json::json!({"n": 1}), &summary()).unwrap();
        handoff.store_result(serde_json::json!({"n": 2}), &summary()).unwrap();
        assert_eq!(handoff.result().unwrap().unwrap()["n"], 2);
        assert!(handoff.clear(RESULT_SLOT).unwrap());
        assert!(handoff.get(RESULT_SLOT).unwrap().is_none());
    }
}
