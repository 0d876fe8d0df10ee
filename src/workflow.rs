//! Workflow timer.
//!
//! Every scheduled step runs on its own named thread: once at start, then
//! each time its interval elapses. Steps do not share state, so a slow or
//! failing step never holds up another one.

use crate::error::{KeepsakeError, Result};
use crate::report::RunReport;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Work performed by one scheduled step.
pub type StepJob = Box<dyn FnMut() -> Result<RunReport> + Send>;

/// Commands understood by a step thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMessage {
    /// Run now instead of waiting for the interval
    RunNow,
    Stop,
}

struct StepHandle {
    name: String,
    command_tx: Sender<StepMessage>,
    thread: JoinHandle<()>,
}

/// Runs scheduled steps until shut down.
#[derive(Default)]
pub struct WorkflowTimer {
    steps: Vec<StepHandle>,
}

impl WorkflowTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` on its own thread, repeating every `interval`.
    ///
    /// # Errors
    ///
    /// Returns error if a step with the same name exists or the thread cannot be spawned.
    pub fn schedule(&mut self, name: impl Into<String>, interval: Duration, job: StepJob) -> Result<()> {
        let name = name.into();
        if interval.is_zero() {
            return Err(KeepsakeError::Argument(format!(
                "workflow step '{name}' needs a non-zero interval"
            )));
        }

        let (command_tx, command_rx) = channel();
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("step-{name}"))
            .spawn(move || {
                let mut job = job;
                loop {
                    run_step(&thread_name, &mut job);
                    match command_rx.recv_timeout(interval) {
                        Ok(StepMessage::RunNow) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(StepMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!(step = %thread_name, "Workflow step stopped");
            })
            .map_err(|e| {
                KeepsakeError::Other(format!("Failed to spawn workflow step '{name}': {e}"))
            })?;

        tracing::info!(step = %name, interval_secs = interval.as_secs(), "Scheduled workflow step");
        self.steps.push(StepHandle {
            name,
            command_tx,
            thread,
        });
        Ok(())
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Send a command to the step with `name`.
    ///
    /// # Errors
    ///
    /// Returns error if no step has that name or its thread has stopped.
    pub fn send(&self, name: &str, message: StepMessage) -> Result<()> {
        let step = self
            .steps
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| KeepsakeError::Argument(format!("no workflow step named '{name}'")))?;
        step.command_tx
            .send(message)
            .map_err(|_closed| KeepsakeError::Other(format!("workflow step '{name}' has stopped")))
    }

    /// Stop every step and wait for running jobs to finish.
    pub fn shutdown(self) {
        for step in &self.steps {
            let _ = step.command_tx.send(StepMessage::Stop);
        }
        for step in self.steps {
            if step.thread.join().is_err() {
                tracing::error!(step = %step.name, "Workflow step panicked");
            }
        }
    }
}

fn run_step(name: &str, job: &mut StepJob) {
    let started = Instant::now();
    match job() {
        Ok(report) => tracing::info!(step = name, "{}", report.summary()),
        Err(e) => tracing::error!(
            step = name,
            error = %e,
            elapsed_ms = started.elapsed().as_millis(),
            "Workflow step failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>, fail: bool) -> StepJob {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(KeepsakeError::Catalog("catalog offline".to_owned()))
            } else {
                Ok(RunReport::default())
            }
        })
    }

    #[test]
    fn test_step_runs_at_start_and_on_demand() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut timer = WorkflowTimer::new();
        timer
            .schedule("preserve:Photos", Duration::from_secs(3600), counting_job(&counter, false))
            .unwrap();

        timer.send("preserve:Photos", StepMessage::RunNow).unwrap();
        timer.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_step_keeps_running_and_others_unaffected() {
        let failing = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicUsize::new(0));
        let mut timer = WorkflowTimer::new();
        timer
            .schedule("update:A", Duration::from_secs(3600), counting_job(&failing, true))
            .unwrap();
        timer
            .schedule("full-validation:B", Duration::from_secs(3600), counting_job(&healthy, false))
            .unwrap();
        assert_eq!(timer.step_names(), vec!["update:A", "full-validation:B"]);

        timer.send("update:A", StepMessage::RunNow).unwrap();
        timer.shutdown();

        assert_eq!(failing.load(Ordering::SeqCst), 2);
        assert_eq!(healthy.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_schedule_rejects_zero_interval() {
        let mut timer = WorkflowTimer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(timer.schedule("x", Duration::ZERO, counting_job(&counter, false)).is_err());
        assert!(timer.is_empty());
        assert!(timer.send("x", StepMessage::RunNow).is_err());
    }
}
