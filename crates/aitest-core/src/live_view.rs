//! Throttled, full-repaint terminal progress view.
//!
//! The engine calls [`LiveRenderer::maybe_render`] after every state change.
//! A frame is painted only when the minimum interval has passed since the
//! last paint and no other task is mid-paint; otherwise the call returns
//! immediately.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::debug;

use crate::metrics::METRICS;
use crate::progress::{PhaseStatus, ProgressAggregator, ProgressSnapshot};

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(200);

const BAR_WIDTH: usize = 20;

struct Screen {
    out: Box<dyn Write + Send>,
    last_paint: Option<Instant>,
    last_lines: usize,
}

pub struct LiveRenderer {
    screen: Option<Mutex<Screen>>,
    min_interval: Duration,
}

impl std::fmt::Debug for LiveRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveRenderer")
            .field("enabled", &self.is_enabled())
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl LiveRenderer {
    pub fn new(out: impl Write + Send + 'static, min_interval: Duration) -> Self {
        Self {
            screen: Some(Mutex::new(Screen {
                out: Box::new(out),
                last_paint: None,
                last_lines: 0,
            })),
            min_interval,
        }
    }

    pub fn stdout(min_interval: Duration) -> Self {
        Self::new(io::stdout(), min_interval)
    }

    /// A renderer that never paints.
    pub fn disabled() -> Self {
        Self {
            screen: None,
            min_interval: DEFAULT_REFRESH,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.screen.is_some()
    }

    /// Paint a frame unless one was painted less than `min_interval` ago.
    pub fn maybe_render(&self, progress: &ProgressAggregator) -> bool {
        self.paint(progress, false)
    }

    /// Paint a frame regardless of the throttle.
    pub fn render_now(&self, progress: &ProgressAggregator) -> bool {
        self.paint(progress, true)
    }

    fn paint(&self, progress: &ProgressAggregator, force: bool) -> bool {
        let Some(screen) = &self.screen else {
            return false;
        };
        // Another task is painting; its frame is at most one change stale.
        let Ok(mut screen) = screen.try_lock() else {
            METRICS.inc_frames_skipped();
            return false;
        };
        let now = Instant::now();
        if !force
            && screen
                .last_paint
                .is_some_and(|last| now.duration_since(last) < self.min_interval)
        {
            METRICS.inc_frames_skipped();
            return false;
        }

        let lines = format_frame(&progress.snapshot());
        let previous = screen.last_lines;
        if let Err(e) = write_frame(&mut screen.out, previous, &lines) {
            debug!(error = %e, "live view write failed");
            return false;
        }
        screen.last_paint = Some(now);
        screen.last_lines = lines.len();
        METRICS.inc_frames_painted();
        true
    }
}

fn write_frame<W: Write>(out: &mut W, previous_lines: usize, lines: &[String]) -> io::Result<()> {
    if previous_lines > 0 {
        let up = u16::try_from(previous_lines).unwrap_or(u16::MAX);
        queue!(out, MoveToPreviousLine(up))?;
    }
    queue!(out, Clear(ClearType::FromCursorDown))?;
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

fn bar(completed: usize, total: usize) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        completed * BAR_WIDTH / total
    };
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn phase(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending => "pending",
        PhaseStatus::Running => "running",
        PhaseStatus::Done => "done",
    }
}

/// Text lines of one frame. Pending rounds collapse to a single line.
pub fn format_frame(snapshot: &ProgressSnapshot) -> Vec<String> {
    let mut lines = Vec::with_capacity(1 + snapshot.rounds.len() * 3);
    let mut header = format!(
        "Progress {}/{} [{}]",
        snapshot.completed,
        snapshot.total,
        bar(snapshot.completed, snapshot.total)
    );
    if snapshot.failed > 0 {
        header.push_str(&format!("  {} failed", snapshot.failed));
    }
    let in_flight = snapshot.in_flight();
    if in_flight > 0 {
        header.push_str(&format!("  {in_flight} in flight"));
    }
    lines.push(header);

    for round in &snapshot.rounds {
        lines.push(format!(
            "  round {} {} {}/{}",
            round.round,
            phase(round.status),
            round.completed,
            round.total
        ));
        if round.status != PhaseStatus::Running {
            continue;
        }
        for prompt in &round.prompts {
            let mut line = format!(
                "    {:<16} [{}] {}/{}",
                prompt.name,
                bar(prompt.completed, prompt.total),
                prompt.completed,
                prompt.total
            );
            if prompt.failed > 0 {
                line.push_str(&format!(" ({} failed)", prompt.failed));
            }
            lines.push(line);
        }
    }
    lines
}
