//! ExecutionBridge - run long operations off the interactive thread
//!
//! The bridge owns a value (the workflow) between operations. Submitting an
//! operation moves the value onto a dedicated worker thread with its own
//! current-thread tokio runtime; when the operation finishes the value comes
//! back through a channel together with the result and everything written to
//! the [`OutputSink`]. While an operation is in flight further submissions are
//! rejected with [`BridgeError::Busy`].

use std::future::Future;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("An operation is already running")]
    Busy,

    #[error("The worker was lost; the session must be recreated")]
    WorkerLost,

    #[error("Failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Failed to build worker runtime: {0}")]
    Runtime(String),
}

/// Ordered line buffer handed to an operation
///
/// Lines written by the operation are returned, joined with newlines, when it
/// completes. A sink created with [`OutputSink::discard`] drops everything.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: Option<mpsc::Sender<String>>,
}

impl OutputSink {
    /// Sink plus the collector that reads it back
    pub fn channel() -> (Self, OutputCollector) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, OutputCollector { rx })
    }

    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Append one line
    pub fn line(&self, line: impl Into<String>) {
        if let Some(ref tx) = self.tx {
            // Collector gone means nobody is interested any more
            let _ = tx.send(line.into());
        }
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::discard()
    }
}

/// Reading end of an [`OutputSink`]
pub struct OutputCollector {
    rx: mpsc::Receiver<String>,
}

impl OutputCollector {
    /// Every line written so far, in order
    pub fn drain(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }

    /// Every line written so far, joined with newlines
    pub fn join(&self) -> String {
        self.drain().join("\n")
    }
}

/// What comes back from the worker
struct Completion<T, R> {
    value: T,
    result: Result<R, BridgeError>,
    output: String,
}

/// A finished operation as seen by the caller
#[derive(Debug)]
pub struct Finished<R> {
    pub result: R,
    /// All sink output of the operation, joined with newlines
    pub output: String,
}

/// Guarded handoff of `T` to a worker thread
pub struct ExecutionBridge<T, R> {
    slot: Option<T>,
    processing: bool,
    pending: Option<mpsc::Receiver<Completion<T, R>>>,
}

impl<T, R> ExecutionBridge<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(value: T) -> Self {
        debug!("ExecutionBridge::new: called");
        Self {
            slot: Some(value),
            processing: false,
            pending: None,
        }
    }

    /// Whether an operation is in flight
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// The owned value, unless a worker holds it (or lost it)
    pub fn get(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.slot.as_mut()
    }

    /// Put a new value in place after [`BridgeError::WorkerLost`]
    pub fn replace(&mut self, value: T) -> Result<Option<T>, BridgeError> {
        if self.processing {
            return Err(BridgeError::Busy);
        }
        Ok(self.slot.replace(value))
    }

    /// Start `op` on a worker thread
    ///
    /// Rejected with `Busy` while another operation runs; the rejected `op` is
    /// dropped without being called and the owned value is untouched.
    pub fn submit<F, Fut>(&mut self, op: F) -> Result<(), BridgeError>
    where
        F: FnOnce(T, OutputSink) -> Fut + Send + 'static,
        Fut: Future<Output = (T, R)>,
    {
        debug!(processing = self.processing, "ExecutionBridge::submit: called");
        if self.processing {
            info!("Rejected submission: operation already running");
            return Err(BridgeError::Busy);
        }
        let value = self.slot.take().ok_or(BridgeError::WorkerLost)?;

        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("webpilot-worker".to_string())
            .spawn(move || run_worker(value, op, tx));

        match spawned {
            Ok(_) => {
                self.processing = true;
                self.pending = Some(rx);
                Ok(())
            }
            Err(e) => {
                // The closure (and the value) went down with the failed spawn
                error!(error = %e, "Failed to spawn worker thread");
                Err(BridgeError::Spawn(e))
            }
        }
    }

    /// Collect a finished operation without blocking
    pub fn try_complete(&mut self) -> Option<Result<Finished<R>, BridgeError>> {
        let outcome = match self.pending.as_ref()?.try_recv() {
            Ok(completion) => Ok(completion),
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(BridgeError::WorkerLost),
        };
        Some(self.finish(outcome))
    }

    /// Wait up to `timeout` for the running operation
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<Finished<R>, BridgeError>> {
        let outcome = match self.pending.as_ref()?.recv_timeout(timeout) {
            Ok(completion) => Ok(completion),
            Err(mpsc::RecvTimeoutError::Timeout) => return None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::WorkerLost),
        };
        Some(self.finish(outcome))
    }

    /// Block until the running operation finishes
    pub fn wait(&mut self) -> Option<Result<Finished<R>, BridgeError>> {
        let outcome = self.pending.as_ref()?.recv().map_err(|_| BridgeError::WorkerLost);
        Some(self.finish(outcome))
    }

    fn finish(&mut self, outcome: Result<Completion<T, R>, BridgeError>) -> Result<Finished<R>, BridgeError> {
        self.processing = false;
        self.pending = None;

        let completion = outcome.inspect_err(|e| error!(error = %e, "Worker ended without handing back"))?;
        self.slot = Some(completion.value);
        debug!(output_len = completion.output.len(), "ExecutionBridge::finish: value returned");
        completion.result.map(|result| Finished {
            result,
            output: completion.output,
        })
    }
}

fn run_worker<T, R, F, Fut>(value: T, op: F, tx: mpsc::Sender<Completion<T, R>>)
where
    F: FnOnce(T, OutputSink) -> Fut,
    Fut: Future<Output = (T, R)>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = tx.send(Completion {
                value,
                result: Err(BridgeError::Runtime(e.to_string())),
                output: String::new(),
            });
            return;
        }
    };

    let (sink, collector) = OutputSink::channel();
    let (value, result) = runtime.block_on(op(value, sink));

    // Send fails only when the bridge itself was dropped
    let _ = tx.send(Completion {
        value,
        result: Ok(result),
        output: collector.join(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_output_sink_joins_lines_in_order() {
        let (sink, collector) = OutputSink::channel();
        sink.line("first");
        sink.clone().line("second");
        sink.line(String::from("third"));
        assert_eq!(collector.join(), "first\nsecond\nthird");
        assert_eq!(collector.join(), "");
    }

    #[test]
    fn test_discard_sink() {
        OutputSink::discard().line("nobody hears this");
    }

    #[test]
    fn test_submit_returns_value_result_and_output() {
        let mut bridge: ExecutionBridge<Vec<u32>, usize> = ExecutionBridge::new(vec![1, 2]);

        bridge
            .submit(|mut v: Vec<u32>, out: OutputSink| async move {
                out.line("pushing");
                tokio::task::yield_now().await;
                v.push(3);
                out.line("pushed");
                let len = v.len();
                (v, len)
            })
            .unwrap();
        assert!(bridge.is_processing());
        assert!(bridge.get().is_none());

        let finished = bridge.wait().unwrap().unwrap();
        assert_eq!(finished.result, 3);
        assert_eq!(finished.output, "pushing\npushed");
        assert_eq!(bridge.get(), Some(&vec![1, 2, 3]));
        assert!(!bridge.is_processing());
    }

    #[test]
    fn test_concurrent_submit_is_rejected() {
        let mut bridge: ExecutionBridge<Vec<&'static str>, ()> = ExecutionBridge::new(Vec::new());
        let gate = Arc::new(Barrier::new(2));

        let worker_gate = gate.clone();
        bridge
            .submit(move |mut v, _out| async move {
                worker_gate.wait();
                v.push("first");
                (v, ())
            })
            .unwrap();

        let second = bridge.submit(|mut v, _out| async move {
            v.push("second");
            (v, ())
        });
        assert!(matches!(second, Err(BridgeError::Busy)));
        assert!(bridge.is_processing());

        gate.wait();
        bridge.wait().unwrap().unwrap();
        // Only the first operation ever touched the value
        assert_eq!(bridge.get(), Some(&vec!["first"]));
    }

    #[test]
    fn test_try_complete_while_running() {
        let mut bridge: ExecutionBridge<u8, ()> = ExecutionBridge::new(0);
        assert!(bridge.try_complete().is_none());

        let gate = Arc::new(Barrier::new(2));
        let worker_gate = gate.clone();
        bridge
            .submit(move |v, _out| async move {
                worker_gate.wait();
                (v + 1, ())
            })
            .unwrap();

        assert!(bridge.try_complete().is_none());
        assert!(bridge.wait_timeout(Duration::from_millis(10)).is_none());
        gate.wait();

        let finished = bridge.wait_timeout(Duration::from_secs(10)).unwrap();
        assert!(finished.is_ok());
        assert_eq!(bridge.get(), Some(&1));
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let mut bridge: ExecutionBridge<u8, ()> = ExecutionBridge::new(0);
        bridge
            .submit(|v, _out| async move {
                if v == 0 {
                    panic!("worker exploded");
                }
                (v, ())
            })
            .unwrap();

        assert!(matches!(bridge.wait(), Some(Err(BridgeError::WorkerLost))));
        assert!(!bridge.is_processing());
        assert!(bridge.get().is_none());
        assert!(matches!(bridge.submit(|v, _out| async move { (v, ()) }), Err(BridgeError::WorkerLost)));

        bridge.replace(9).unwrap();
        assert_eq!(bridge.get(), Some(&9));
    }
}
