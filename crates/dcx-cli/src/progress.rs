use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

const PROGRESS_TICK_MS: u64 = 2_000;
const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Cooperative stop signal shared between a turn and its progress task.
#[derive(Debug, Clone, Default)]
pub(crate) struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

/// Prints a rotating status line to stderr until the signal fires.
pub(crate) struct ProgressReporter {
    signal: StopSignal,
    task: JoinHandle<()>,
}

impl ProgressReporter {
    pub(crate) fn start(status: watch::Receiver<String>) -> Self {
        let signal = StopSignal::new();
        let task = tokio::spawn(render_progress(
            status,
            signal.clone(),
            Duration::from_millis(PROGRESS_TICK_MS),
        ));
        Self { signal, task }
    }

    pub(crate) async fn finish(self) {
        self.signal.stop();
        if let Err(error) = self.task.await {
            tracing::debug!(%error, "progress task ended abnormally");
        }
    }
}

async fn render_progress(status: watch::Receiver<String>, signal: StopSignal, tick: Duration) {
    let started = Instant::now();
    let mut frame = 0usize;
    let mut printed = false;
    loop {
        tokio::select! {
            _ = signal.stopped() => break,
            _ = tokio::time::sleep(tick) => {}
        }
        let line = progress_line(
            SPINNER_FRAMES[frame % SPINNER_FRAMES.len()],
            status.borrow().as_str(),
            started.elapsed(),
        );
        frame += 1;
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{line}");
        let _ = stderr.flush();
        printed = true;
    }
    if printed {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }
}

fn progress_line(spinner: char, status: &str, elapsed: Duration) -> String {
    let status = if status.is_empty() { "Working..." } else { status };
    format!("{spinner} {status} ({}s)", elapsed.as_secs())
}
