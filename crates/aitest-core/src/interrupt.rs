//! Cooperative interruption and hand-off of partial results.
//!
//! Cancelling the controller's token stops new admissions at every gate.
//! Cases already in flight get [`InterruptController::grace`] to finish;
//! anything still running after that is abandoned and contributes no result.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::RunOutcome;
use crate::obs::{self, RunSpan};
use crate::report::ReportRenderer;

/// How the run driver ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Finished without being interrupted.
    Completed,
    /// Interrupted; every in-flight case finished within the grace period.
    Drained,
    /// Interrupted; `in_flight` cases were abandoned when the grace period ran out.
    GraceElapsed { in_flight: usize },
}

#[derive(Debug)]
pub struct InterruptController {
    token: CancellationToken,
    grace: Duration,
    published: AtomicBool,
}

impl InterruptController {
    pub fn new(grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace,
            published: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Signal cancellation. Safe to call any number of times from anywhere.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel on the first Ctrl-C.
    pub fn watch_ctrl_c(&self) -> tokio::task::JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        warn!("interrupt received; finishing in-flight cases");
                        token.cancel();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
                },
                _ = token.cancelled() => {}
            }
        })
    }

    /// Await `driver`, bounding the wait by the grace period once cancelled.
    ///
    /// When the grace period elapses, `driver` is dropped along with any
    /// tasks it owns; `in_flight` is sampled just before that.
    pub async fn supervise<F>(&self, driver: F, in_flight: impl Fn() -> usize) -> DrainOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(driver);
        tokio::select! {
            biased;
            () = &mut driver => {
                return if self.token.is_cancelled() {
                    DrainOutcome::Drained
                } else {
                    DrainOutcome::Completed
                };
            }
            _ = self.token.cancelled() => {}
        }

        info!(
            grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX),
            in_flight = in_flight(),
            "draining in-flight cases"
        );
        match tokio::time::timeout(self.grace, &mut driver).await {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => {
                let abandoned = in_flight();
                warn!(abandoned, "grace period elapsed; abandoning in-flight cases");
                DrainOutcome::GraceElapsed {
                    in_flight: abandoned,
                }
            }
        }
    }

    /// Hand the run's result to `renderer`, marked partial when interrupted.
    ///
    /// May be called once per controller.
    pub fn publish(
        &self,
        outcome: &RunOutcome,
        renderer: &dyn ReportRenderer,
        output_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        if self.published.swap(true, Ordering::SeqCst) {
            bail!("report for run {} was already published", outcome.run_id);
        }
        let _span = RunSpan::enter(&outcome.run_id);
        let partial = outcome.is_partial();
        let path = renderer
            .render(&outcome.result, output_dir, partial)
            .with_context(|| format!("render {} report", renderer.format()))?;
        obs::emit_report_written(&outcome.run_id, &path, partial);
        Ok(path)
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new(crate::engine::DEFAULT_GRACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uninterrupted_driver_completes() {
        let controller = InterruptController::new(Duration::from_millis(10));
        let outcome = controller.supervise(async {}, || 0).await;
        assert_eq!(outcome, DrainOutcome::Completed);
        assert!(!controller.is_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_that_finishes_within_grace_is_drained() {
        let controller = InterruptController::new(Duration::from_secs(5));
        controller.cancel();
        let outcome = controller
            .supervise(tokio::time::sleep(Duration::from_secs(1)), || 1)
            .await;
        assert_eq!(outcome, DrainOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_driver_is_abandoned_after_grace() {
        let controller = InterruptController::new(Duration::from_secs(2));
        let token = controller.token().clone();
        let started = tokio::time::Instant::now();
        let driver = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
            std::future::pending::<()>().await;
        };
        let outcome = controller.supervise(driver, || 3).await;
        assert_eq!(outcome, DrainOutcome::GraceElapsed { in_flight: 3 });
        assert!(started.elapsed() >= Duration::from_millis(2100));
    }
}
