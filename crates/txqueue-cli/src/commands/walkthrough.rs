//! Scripted tour of the reservation lifecycle on a fresh queue.

use crate::support::{init_tracing, print_json_or_exit};
use serde::Serialize;
use txqueue::{EntryKey, QueueError, ReservationQueue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<EntryKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub backlog: usize,
    pub reserved: usize,
}

struct Recorder<'a> {
    queue: &'a ReservationQueue<i64>,
    steps: Vec<Step>,
}

impl<'a> Recorder<'a> {
    fn new(queue: &'a ReservationQueue<i64>) -> Self {
        Self {
            queue,
            steps: Vec::new(),
        }
    }

    fn record(
        &mut self,
        action: &'static str,
        key: Option<EntryKey>,
        outcome: Result<Option<i64>, QueueError>,
    ) {
        let stats = self.queue.stats();
        let (value, error) = match outcome {
            Ok(value) => (value, None),
            Err(err) => (None, Some(err.to_string())),
        };
        self.steps.push(Step {
            action,
            key,
            value,
            error,
            backlog: stats.backlog,
            reserved: stats.reserved,
        });
    }

    fn enqueue(&mut self, value: i64) -> EntryKey {
        let key = self.queue.enqueue(value);
        self.record("enqueue", Some(key), Ok(Some(value)));
        key
    }

    fn reserve(&mut self) -> Option<EntryKey> {
        match self.queue.create_transaction() {
            Ok(reservation) => {
                self.record("reserve", Some(reservation.key), Ok(Some(reservation.value)));
                Some(reservation.key)
            }
            Err(err) => {
                self.record("reserve", None, Err(err));
                None
            }
        }
    }

    fn update(&mut self, key: EntryKey, value: i64) {
        let outcome = self.queue.update_transaction(key, value).map(|()| Some(value));
        self.record("update", Some(key), outcome);
    }

    fn discard(&mut self, key: EntryKey) {
        let outcome = self.queue.discard_transaction(key).map(|()| None);
        self.record("discard", Some(key), outcome);
    }

    fn close(&mut self, key: EntryKey) {
        let outcome = self.queue.close_transaction(key).map(Some);
        self.record("close", Some(key), outcome);
    }
}

/// Enqueue two entries, discard the first reservation so it moves behind the
/// second, then finish both and show the two failure kinds.
pub fn walkthrough() -> Vec<Step> {
    let queue = ReservationQueue::new();
    let mut rec = Recorder::new(&queue);

    rec.enqueue(1);
    rec.enqueue(2);

    if let Some(first) = rec.reserve() {
        rec.discard(first);
    }
    if let Some(second) = rec.reserve() {
        rec.close(second);
    }
    if let Some(first) = rec.reserve() {
        rec.update(first, 10);
        rec.close(first);
        rec.close(first);
    }
    rec.reserve();

    rec.steps
}

pub fn run(log_level: Option<String>, json_output: bool) {
    init_tracing(log_level.as_deref().unwrap_or(crate::config::DEFAULT_LOG_LEVEL));
    let steps = walkthrough();

    if json_output {
        print_json_or_exit(&serde_json::json!({
            "action": "walkthrough",
            "steps": steps,
        }));
        return;
    }

    println!("txqueue walkthrough");
    println!();
    for (index, step) in steps.iter().enumerate() {
        let key = step.key.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string());
        let detail = match (&step.value, &step.error) {
            (_, Some(error)) => format!("error: {error}"),
            (Some(value), None) => format!("value {value}"),
            (None, None) => "ok".to_string(),
        };
        println!(
            "  {:>2}. {:<8} {:<4} {:<40} backlog={} reserved={}",
            index + 1,
            step.action,
            key,
            detail,
            step.backlog,
            step.reserved
        );
    }
}
