//! Terminal progress display fed from the service event bus

use indicatif::{ProgressBar, ProgressStyle};
use libskeetsweep::service::events::{Event, EventReceiver};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Which part of a run the display follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching and classification; ends with `AnalysisCompleted`
    Analysis,
    /// Deletion; ends with `SweepCompleted`
    Deletion,
}

impl Stage {
    fn is_final(&self, event: &Event) -> bool {
        match self {
            Stage::Analysis => matches!(event, Event::AnalysisCompleted { .. }),
            Stage::Deletion => matches!(event, Event::SweepCompleted { .. }),
        }
    }
}

pub struct ProgressDisplay {
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    /// Start rendering events for `stage` on stderr
    ///
    /// With `show` false the events are drained without drawing anything.
    pub fn spawn(mut events: EventReceiver, stage: Stage, show: bool) -> Self {
        let handle = tokio::spawn(async move {
            let mut spinner: Option<ProgressBar> = None;
            let mut bar: Option<ProgressBar> = None;

            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Progress display skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if show {
                    render(&event, &mut spinner, &mut bar);
                }
                if stage.is_final(&event) {
                    break;
                }
            }

            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            if let Some(pb) = bar {
                pb.finish_and_clear();
            }
        });

        Self { handle }
    }

    /// Wait for the stage's final event to be drawn
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Stop drawing, e.g. after the stage failed
    pub fn cancel(self) {
        self.handle.abort();
    }
}

fn render(event: &Event, spinner: &mut Option<ProgressBar>, bar: &mut Option<ProgressBar>) {
    match event {
        Event::FetchProgress {
            collection,
            fetched,
        } => {
            let pb = spinner.get_or_insert_with(make_spinner);
            pb.set_message(format!("Fetched {} {}", fetched, collection));
            pb.tick();
        }
        Event::AnalysisCompleted { .. } => {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
        Event::DeletionProgress {
            completed, total, ..
        } => {
            let pb = bar.get_or_insert_with(|| make_bar(*total as u64));
            pb.set_position(*completed as u64);
        }
        Event::DeletionFailed { uri, error } => {
            if let Some(pb) = bar.as_ref() {
                pb.println(format!("  failed: {} ({})", uri, error));
            }
        }
        Event::SweepCompleted { .. } => {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn make_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb
}

fn make_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) Deleting... {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━░"),
    );
    pb
}
