use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::model::Id;

/// Bounded store for job result payloads, keyed by job id.
///
/// When the cap is exceeded the oldest inserted result is dropped. Results
/// are also removed explicitly when their job record is evicted, so the
/// registry never outlives the job table it mirrors.
pub struct JobResultRegistry {
    inner: Mutex<ResultsInner>,
    max_results: usize,
}

struct ResultsInner {
    results: HashMap<Id, Value>,
    insertion_order: VecDeque<Id>,
}

impl JobResultRegistry {
    pub fn new(max_results: usize) -> Self {
        Self {
            inner: Mutex::new(ResultsInner {
                results: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            max_results: max_results.max(1),
        }
    }

    pub fn put(&self, job_id: &str, result: Value) {
        let mut inner = self.inner.lock();
        if inner.results.insert(job_id.to_string(), result).is_none() {
            inner.insertion_order.push_back(job_id.to_string());
        }
        while inner.results.len() > self.max_results {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    inner.results.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<Value> {
        self.inner.lock().results.get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        inner.insertion_order.retain(|id| id != job_id);
        inner.results.remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
