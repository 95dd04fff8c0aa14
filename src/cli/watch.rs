//! `watch` command.
//!
//! Re-aggregates today's usage whenever the session logs change (debounced) and
//! at least once per interval, prints each new frame, and appends a sample to the
//! usage-history timeline when history is enabled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};

use crate::cli::args::{OutputFormat, WatchArgs};
use crate::cli::{AppContext, emit};
use crate::core::debounce::Debouncer;
use crate::core::engine::{Period, UsageEngine};
use crate::core::log_watcher::LogWatcher;
use crate::core::models::{ContextReport, ContextWindowState, Provenance, SessionSummary};
use crate::error::Result;
use crate::render::{self, RenderOptions};
use crate::storage::history::{HistoryStore, UsageSample};

/// One re-aggregation result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchFrame {
    pub computed_at: DateTime<Utc>,
    pub today: SessionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextWindowState>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WatchFrame {
    /// Aggregate today's usage and the latest session's context state.
    ///
    /// Failures are carried in the frame so the loop keeps running.
    #[must_use]
    pub fn compute(engine: &UsageEngine) -> Self {
        let (today, error) = match engine.summarize(&Period::Today) {
            Ok(summary) => (summary, None),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to summarize today");
                (SessionSummary::empty(None), Some(e.to_string()))
            }
        };

        let context = match engine.context(None) {
            Ok(report) => report.primary,
            Err(e) => {
                tracing::debug!(error = %e, "No context state");
                None
            }
        };

        Self {
            computed_at: Utc::now(),
            today,
            context,
            provenance: engine.store().provenance(),
            error,
        }
    }
}

/// State tracking across frames.
#[derive(Debug, Default)]
pub struct WatchState {
    pub frame_count: u64,
    pub error_count: u64,
    pub samples_recorded: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl WatchState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&mut self, frame: &WatchFrame) {
        self.frame_count += 1;
        self.last_frame_at = Some(frame.computed_at);
        if frame.error.is_some() {
            self.error_count += 1;
        }
    }
}

/// Run until Ctrl+C.
///
/// # Errors
///
/// Invalid arguments, an unopenable history database, or a render failure.
pub async fn execute(args: &WatchArgs, ctx: &AppContext) -> Result<()> {
    args.validate()?;

    let engine = ctx.engine.clone();
    engine.prepare_pricing().await;
    let refresh = engine.start_refresh_schedule();

    let history = if ctx.config.history_enabled {
        Some(
            HistoryStore::open(&ctx.paths.history_db_file())?
                .with_retention(ctx.config.history_retention),
        )
    } else {
        None
    };

    let job_engine = engine.clone();
    let debouncer = Debouncer::spawn(ctx.config.debounce, move || {
        WatchFrame::compute(&job_engine)
    });

    // Without a watcher the interval tick still drives updates.
    let _watcher = match LogWatcher::start(engine.log_root(), debouncer.notifier()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Log watcher unavailable, polling only");
            None
        }
    };

    let mut shutdown_rx = shutdown_on(tokio::signal::ctrl_c());

    let mut frames = debouncer.subscribe();
    let mut ticker = interval(Duration::from_secs(args.interval_secs));
    let mut state = WatchState::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => debouncer.notify(),
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    handle_frame(&frame, &mut state, history.as_ref(), ctx.render)?;
                }
            }
            _ = &mut shutdown_rx => break,
        }
    }

    refresh.cancel();
    tracing::debug!(
        frames = state.frame_count,
        errors = state.error_count,
        samples = state.samples_recorded,
        "Watch stopped"
    );
    Ok(())
}

/// Resolves once `signal` fires. A signal that cannot be registered is logged and
/// never resolves, so the watch keeps running until the process is killed.
fn shutdown_on<F>(signal: F) -> oneshot::Receiver<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C; stop watch by killing the process");
                // Holding the sender keeps the receiver pending.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });
    shutdown_rx
}

fn handle_frame(
    frame: &Arc<WatchFrame>,
    state: &mut WatchState,
    history: Option<&HistoryStore>,
    opts: RenderOptions,
) -> Result<()> {
    state.update(frame);

    if let Some(store) = history {
        let sample = UsageSample::capture(&frame.today, frame.context.as_ref(), frame.provenance);
        match store.record_sample(&sample) {
            Ok(_) => state.samples_recorded += 1,
            Err(e) => tracing::warn!(error = %e, "Failed to record usage sample"),
        }
    }

    emit(&render_frame(frame, opts)?);
    Ok(())
}

fn render_frame(frame: &WatchFrame, opts: RenderOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Json => render::robot::render_envelope("watch", frame, opts.pretty),
        OutputFormat::Human => {
            let mut out = render::human::render_summary("Today", &frame.today, opts.color);
            if frame.context.is_some() {
                let report = ContextReport {
                    primary: frame.context.clone(),
                    subagents: Vec::new(),
                };
                out.push_str(&render::human::render_context(&report, opts.color));
            }
            if let Some(error) = &frame.error {
                out.push_str(&format!("Error: {error}\n"));
            }
            Ok(out)
        }
    }
}
