//! Bounded admission at the round, prompt and case levels.
//!
//! Each level is one shared [`Gate`] backed by a counting semaphore. A
//! [`GatePermit`] releases its slot on drop, so every exit path of the guarded
//! region (return, error, panic, task abort) gives the slot back.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::domain::{BenchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLevel {
    Round,
    Prompt,
    Case,
}

impl GateLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Round => "round",
            Self::Prompt => "prompt",
            Self::Case => "case",
        }
    }
}

impl fmt::Display for GateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instrumented slot counters for one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub level: GateLevel,
    pub capacity: usize,
    /// Highest number of simultaneously held slots observed.
    pub peak_held: usize,
    pub held_at_end: usize,
}

/// One counting admission gate.
#[derive(Debug)]
pub struct Gate {
    level: GateLevel,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    held: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl Gate {
    pub fn new(level: GateLevel, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BenchError::InvalidConcurrency {
                gate: level.as_str(),
            });
        }
        Ok(Self {
            level,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            held: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn level(&self) -> GateLevel {
        self.level
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot. Returns `None` only if the gate has been closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        Some(self.track(permit))
    }

    /// Wait for a free slot unless `token` is cancelled first.
    ///
    /// Cancellation wins ties: a slot obtained after the token fired is
    /// handed straight back and `None` is returned.
    pub async fn acquire_unless_cancelled(&self, token: &CancellationToken) -> Option<GatePermit> {
        if token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                let permit = permit.ok()?;
                if token.is_cancelled() {
                    return None;
                }
                Some(self.track(permit))
            }
        }
    }

    /// Stop admitting. Pending and future acquisitions return `None`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn peak_held(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            level: self.level,
            capacity: self.capacity,
            peak_held: self.peak_held(),
            held_at_end: self.held(),
        }
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let now = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            held: Arc::clone(&self.held),
        }
    }
}

/// A held gate slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    held: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Capacities of the three gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    pub round: usize,
    pub prompt: usize,
    pub case: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            round: 1,
            prompt: 2,
            case: 4,
        }
    }
}

impl ConcurrencyLimits {
    pub fn new(round: usize, prompt: usize, case: usize) -> Self {
        Self {
            round,
            prompt,
            case,
        }
    }

    /// Same capacity at every level.
    pub fn uniform(n: usize) -> Self {
        Self::new(n, n, n)
    }
}

/// The three gates shared by every task of one run.
///
/// Acquire order is always round, then prompt, then case.
#[derive(Debug, Clone)]
pub struct ConcurrencyGates {
    pub round: Arc<Gate>,
    pub prompt: Arc<Gate>,
    pub case: Arc<Gate>,
}

impl ConcurrencyGates {
    pub fn new(limits: ConcurrencyLimits) -> Result<Self> {
        Ok(Self {
            round: Arc::new(Gate::new(GateLevel::Round, limits.round)?),
            prompt: Arc::new(Gate::new(GateLevel::Prompt, limits.prompt)?),
            case: Arc::new(Gate::new(GateLevel::Case, limits.case)?),
        })
    }

    pub fn close(&self) {
        self.round.close();
        self.prompt.close();
        self.case.close();
    }

    pub fn stats(&self) -> Vec<GateStats> {
        vec![self.round.stats(), self.prompt.stats(), self.case.stats()]
    }
}
