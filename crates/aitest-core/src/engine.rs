//! Gated fan-out of a work plan over rounds, prompts and cases.
//!
//! Every round, prompt and case runs as its own task. A task holds exactly
//! the permit of its own level for as long as it runs, acquired in
//! round → prompt → case order. Case failures (including panics inside the
//! invoker) become failed [`CaseResult`]s; only a progress consistency
//! violation ends a run with an error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn, Instrument};
use uuid::Uuid;

use crate::domain::{BenchError, CaseOutcome, CaseResult, PromptConfig, Result, RunResult};
use crate::gates::{ConcurrencyGates, ConcurrencyLimits, GateStats};
use crate::interrupt::{DrainOutcome, InterruptController};
use crate::invocation::{InvocationRequest, ModelInvoker};
use crate::live_view::{LiveRenderer, DEFAULT_REFRESH};
use crate::loader::Catalog;
use crate::metrics::METRICS;
use crate::obs;
use crate::progress::{CaseStatus, ProgressAggregator, ProgressSnapshot, ProgressViolation};
use crate::template;
use crate::work_item::{PlannedCase, PromptPlan, RoundPlan, WorkPlan};

/// Default time in-flight cases get to finish after an interrupt.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub rounds: u32,
    pub limits: ConcurrencyLimits,
    /// How long to wait for in-flight cases after an interrupt.
    pub grace: Duration,
    /// Minimum interval between live view repaints.
    pub refresh: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            rounds: 1,
            limits: ConcurrencyLimits::default(),
            grace: DEFAULT_GRACE,
            refresh: DEFAULT_REFRESH,
        }
    }
}

impl RunOptions {
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_limits(mut self, limits: ConcurrencyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Interrupted,
    FatalError,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::FatalError => "fatal_error",
        }
    }
}

/// Everything a finished (or interrupted) run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: RunState,
    pub result: RunResult,
    pub progress: ProgressSnapshot,
    pub gate_stats: Vec<GateStats>,
    pub drain: DrainOutcome,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_partial(&self) -> bool {
        self.state == RunState::Interrupted
    }
}

/// State shared by every task of one run.
struct RunContext {
    run_id: String,
    invoker: Arc<dyn ModelInvoker>,
    progress: Arc<ProgressAggregator>,
    results: Mutex<RunResult>,
    gates: ConcurrencyGates,
    renderer: Arc<LiveRenderer>,
    /// Child of the interrupt token; also cancelled on a fatal violation.
    token: CancellationToken,
    fatal: Mutex<Option<ProgressViolation>>,
}

impl RunContext {
    /// Pass through `Ok`; on a violation stop all admission and remember the first one.
    fn check<T>(&self, outcome: std::result::Result<T, ProgressViolation>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(violation) => {
                error!(run_id = %self.run_id, error = %violation, "progress consistency violation; aborting run");
                self.fatal
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get_or_insert(violation);
                self.token.cancel();
                self.gates.close();
                None
            }
        }
    }

    fn render(&self) {
        self.renderer.maybe_render(&self.progress);
    }
}

pub struct ExecutionEngine {
    invoker: Arc<dyn ModelInvoker>,
    catalog: Arc<Catalog>,
    renderer: Arc<LiveRenderer>,
    state: Mutex<RunState>,
    progress: Mutex<Option<Arc<ProgressAggregator>>>,
}

impl ExecutionEngine {
    pub fn new(invoker: Arc<dyn ModelInvoker>, catalog: Arc<Catalog>) -> Self {
        Self {
            invoker,
            catalog,
            renderer: Arc::new(LiveRenderer::disabled()),
            state: Mutex::new(RunState::Idle),
            progress: Mutex::new(None),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<LiveRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// State of the most recent run.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Live snapshot of the current (or most recent) run's progress.
    pub fn progress_snapshot(&self) -> Option<ProgressSnapshot> {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.snapshot())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Execute `selected` prompts for `options.rounds` rounds.
    ///
    /// Returns an error only for setup failures (nothing could start) and
    /// progress consistency violations. An interrupted run returns `Ok` with
    /// [`RunState::Interrupted`] and a partial result.
    #[instrument(skip_all, fields(rounds = options.rounds, selected = selected.len()))]
    pub async fn run(
        &self,
        selected: &[String],
        options: &RunOptions,
        interrupt: &InterruptController,
    ) -> Result<RunOutcome> {
        let plan = WorkPlan::build(options.rounds, selected, &self.catalog)?;
        let gates = ConcurrencyGates::new(options.limits)?;
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let ctx = Arc::new(RunContext {
            run_id: run_id.clone(),
            invoker: Arc::clone(&self.invoker),
            progress: Arc::new(ProgressAggregator::new(&plan)),
            results: Mutex::new(RunResult::new()),
            gates,
            renderer: Arc::clone(&self.renderer),
            token: interrupt.token().child_token(),
            fatal: Mutex::new(None),
        });

        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&ctx.progress));
        self.set_state(RunState::Running);
        let limits = options.limits;
        obs::emit_run_started(
            &run_id,
            options.rounds,
            plan.len(),
            &format!("{}/{}/{}", limits.round, limits.prompt, limits.case),
        );
        ctx.renderer.render_now(&ctx.progress);

        let progress = Arc::clone(&ctx.progress);
        let drain = interrupt
            .supervise(drive(Arc::clone(&ctx), plan), || {
                progress.snapshot().in_flight()
            })
            .await;

        ctx.renderer.render_now(&ctx.progress);
        let snapshot = ctx.progress.snapshot();
        let fatal = ctx.fatal.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(violation) = fatal {
            self.set_state(RunState::FatalError);
            obs::emit_run_finished(
                &run_id,
                elapsed_ms(started),
                snapshot.completed,
                snapshot.failed,
                RunState::FatalError.as_str(),
            );
            return Err(BenchError::ProgressViolation(violation));
        }

        let state = if interrupt.is_interrupted() && !snapshot.is_finished() {
            obs::emit_run_interrupted(
                &run_id,
                snapshot.completed,
                snapshot.total,
                snapshot.in_flight(),
            );
            RunState::Interrupted
        } else {
            RunState::Completed
        };

        let mut result = std::mem::take(&mut *ctx.results.lock().unwrap_or_else(|e| e.into_inner()));
        if state == RunState::Interrupted {
            result = result.into_partial();
        }

        self.set_state(state);
        METRICS.flush();
        obs::emit_run_finished(
            &run_id,
            elapsed_ms(started),
            result.case_count(),
            result.failed_count(),
            state.as_str(),
        );

        Ok(RunOutcome {
            run_id,
            state,
            result,
            progress: snapshot,
            gate_stats: ctx.gates.stats(),
            drain,
            elapsed: started.elapsed(),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run every round to a terminal state. Dropping this future aborts all
/// outstanding tasks.
async fn drive(ctx: Arc<RunContext>, plan: WorkPlan) {
    let mut rounds = JoinSet::new();
    for round in plan.into_rounds() {
        rounds.spawn(run_round(Arc::clone(&ctx), round).in_current_span());
    }
    while let Some(joined) = rounds.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "round task ended abnormally");
        }
    }
}

async fn run_round(ctx: Arc<RunContext>, round: RoundPlan) {
    let Some(_permit) = ctx.gates.round.acquire_unless_cancelled(&ctx.token).await else {
        debug!(round = round.round, "round not admitted");
        return;
    };
    if ctx.check(ctx.progress.begin_round(round.round)).is_none() {
        return;
    }
    obs::emit_round_started(&ctx.run_id, round.round, round.case_count());
    ctx.render();

    let round_number = round.round;
    let mut prompts = JoinSet::new();
    for prompt in round.prompts {
        prompts.spawn(run_prompt(Arc::clone(&ctx), round_number, prompt).in_current_span());
    }
    while let Some(joined) = prompts.join_next().await {
        if let Err(e) = joined {
            warn!(round = round_number, error = %e, "prompt task ended abnormally");
        }
    }
}

async fn run_prompt(ctx: Arc<RunContext>, round: u32, plan: PromptPlan) {
    let Some(_permit) = ctx.gates.prompt.acquire_unless_cancelled(&ctx.token).await else {
        return;
    };
    let name = plan.prompt.name.clone();
    let total = plan.cases.len();

    let mut units = JoinSet::new();
    for planned in plan.cases {
        units.spawn(run_case(Arc::clone(&ctx), Arc::clone(&plan.prompt), planned).in_current_span());
    }
    let mut finished = 0;
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok(true) => finished += 1,
            Ok(false) => {}
            Err(e) => warn!(round, prompt = %name, error = %e, "case task ended abnormally"),
        }
    }

    if finished == total {
        ctx.check(ctx.progress.complete_in_round(round, &name));
        ctx.render();
    }
}

/// Execute one work item. Returns `true` once its result is recorded.
async fn run_case(ctx: Arc<RunContext>, prompt: Arc<PromptConfig>, planned: PlannedCase) -> bool {
    let Some(_permit) = ctx.gates.case.acquire_unless_cancelled(&ctx.token).await else {
        return false;
    };
    let key = planned.item.key();
    if ctx.check(ctx.progress.begin_case(&key)).is_none() {
        return false;
    }
    ctx.render();

    let resolved = template::resolve(&prompt, &planned.case);
    let request = InvocationRequest {
        vendor: prompt.vendor.clone(),
        model: prompt.model.clone(),
        system_prompt: resolved.text.clone(),
        user_content: planned.case.content.clone(),
    };
    if ctx
        .check(ctx.progress.update_case_status(&key, CaseStatus::AwaitingResponse))
        .is_none()
    {
        return false;
    }

    METRICS.inc_cases_invoked();
    let started = Instant::now();
    let invoked = AssertUnwindSafe(ctx.invoker.invoke(request))
        .catch_unwind()
        .await;
    let measured = started.elapsed();

    let (outcome, elapsed) = match invoked {
        Ok(Ok(output)) => (
            CaseOutcome::Success {
                output: output.text,
                usage: output.usage,
            },
            output.elapsed,
        ),
        Ok(Err(e)) => (CaseOutcome::Failed { error: e.to_string() }, measured),
        Err(panic) => (
            CaseOutcome::Failed {
                error: format!("invocation panicked: {}", panic_message(&*panic)),
            },
            measured,
        ),
    };

    if ctx
        .check(ctx.progress.update_case_status(&key, CaseStatus::Processing))
        .is_none()
    {
        return false;
    }

    let result = CaseResult {
        round: key.round,
        prompt_name: key.prompt.clone(),
        case_index: key.case_index,
        case_id: planned.item.case_id.clone(),
        case_name: planned.item.case_name.clone(),
        case_description: planned.case.description.clone(),
        case_content: planned.case.content.clone(),
        case_args: planned.case.effective_args(),
        vendor: prompt.vendor.clone(),
        model: prompt.model.clone(),
        prompt_template: prompt.template.clone(),
        resolved_prompt: resolved.text,
        elapsed_secs: elapsed.as_secs_f64(),
        outcome,
    };
    let success = result.is_success();
    if let Some(error) = result.error() {
        METRICS.inc_cases_failed();
        obs::emit_case_failed(&ctx.run_id, &key, &error);
    }

    // Completion is visible before the result is.
    if ctx.check(ctx.progress.complete_case(&key, success)).is_none() {
        return false;
    }
    let fresh = ctx
        .results
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .record(result);
    if !fresh {
        ctx.check::<()>(Err(ProgressViolation::AlreadyCompleted(key)));
        return false;
    }
    ctx.render();
    true
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
