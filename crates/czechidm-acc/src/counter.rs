//! Sliding window of provisioning attempts per system and operation type
//!
//! Each window is a list of epoch millisecond timestamps guarded by its own
//! lock, so attempts for different systems never contend. Windows live in
//! memory only and start empty after a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use czechidm_common::{Clock, ProvisioningEventType};

type Window = Arc<Mutex<VecDeque<i64>>>;

/// Cached attempt timestamps of one system, per operation type
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningBreakItems {
    execute_items: HashMap<ProvisioningEventType, Vec<i64>>,
}

impl ProvisioningBreakItems {
    pub fn items(&self, operation_type: ProvisioningEventType) -> &[i64] {
        self.execute_items
            .get(&operation_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn items_mut(&mut self, operation_type: ProvisioningEventType) -> &mut Vec<i64> {
        self.execute_items.entry(operation_type).or_default()
    }

    pub fn add(&mut self, operation_type: ProvisioningEventType, timestamp: i64) {
        self.items_mut(operation_type).push(timestamp);
    }

    pub fn size(&self, operation_type: ProvisioningEventType) -> usize {
        self.items(operation_type).len()
    }

    pub fn clear(&mut self, operation_type: ProvisioningEventType) {
        self.execute_items.remove(&operation_type);
    }

    pub fn is_empty(&self) -> bool {
        self.execute_items.values().all(Vec::is_empty)
    }
}

#[derive(Debug)]
pub struct OperationCounterCache {
    clock: Arc<dyn Clock>,
    windows: DashMap<(Uuid, ProvisioningEventType), Window>,
}

impl OperationCounterCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn window(&self, system_id: Uuid, operation_type: ProvisioningEventType) -> Window {
        self.windows
            .entry((system_id, operation_type))
            .or_default()
            .clone()
    }

    /// Record an attempt now and return the attempts within the last `period` ms
    ///
    /// The returned count includes the attempt just recorded.
    pub fn record_and_count(
        &self,
        system_id: Uuid,
        operation_type: ProvisioningEventType,
        period: i64,
    ) -> usize {
        let now = self.clock.now_millis();
        let window = self.window(system_id, operation_type);
        let mut items = window.lock();
        items.push_back(now);
        let oldest = now - period;
        items.retain(|timestamp| *timestamp >= oldest);
        items.len()
    }

    /// Attempts within the last `period` ms, without recording a new one
    pub fn count(&self, system_id: Uuid, operation_type: ProvisioningEventType, period: i64) -> usize {
        let oldest = self.clock.now_millis() - period;
        self.windows
            .get(&(system_id, operation_type))
            .map(|window| window.lock().iter().filter(|t| **t >= oldest).count())
            .unwrap_or(0)
    }

    pub fn clear(&self, system_id: Uuid, operation_type: ProvisioningEventType) {
        self.windows.remove(&(system_id, operation_type));
    }

    pub fn clear_system(&self, system_id: Uuid) {
        for operation_type in ProvisioningEventType::ALL {
            self.clear(system_id, operation_type);
        }
    }

    pub fn snapshot(&self, system_id: Uuid) -> ProvisioningBreakItems {
        let mut items = ProvisioningBreakItems::default();
        for operation_type in ProvisioningEventType::ALL {
            if let Some(window) = self.windows.get(&(system_id, operation_type)) {
                let timestamps: Vec<i64> = window.lock().iter().copied().collect();
                if !timestamps.is_empty() {
                    *items.items_mut(operation_type) = timestamps;
                }
            }
        }
        items
    }

    /// Replace the cached windows of the system
    pub fn replace(&self, system_id: Uuid, items: &ProvisioningBreakItems) {
        for operation_type in ProvisioningEventType::ALL {
            let timestamps = items.items(operation_type);
            if timestamps.is_empty() {
                self.clear(system_id, operation_type);
            } else {
                let window = self.window(system_id, operation_type);
                *window.lock() = timestamps.iter().copied().collect();
            }
        }
    }
}
