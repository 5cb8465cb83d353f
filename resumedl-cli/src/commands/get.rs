//! `get` command: download identifiers with live progress bars.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use resumedl::config::ManagerConfig;
use resumedl::download::{DownloadEvent, DownloadManager, ProgressSignal};
use resumedl::{JobOutcome, JobResult};
use tracing::{info, warn};

use crate::error::CliError;

const PERCENT_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}";
const ACTIVITY_TEMPLATE: &str = "{spinner:.yellow} [{bar:40.yellow/white}] ???% {wide_msg}";

struct Styles {
    percent: ProgressStyle,
    activity: ProgressStyle,
}

impl Styles {
    fn new() -> Result<Self, CliError> {
        let build = |template: &str| {
            ProgressStyle::with_template(template)
                .map(|style| style.progress_chars("━━╌"))
                .map_err(|e| CliError::Progress(e.to_string()))
        };
        Ok(Self {
            percent: build(PERCENT_TEMPLATE)?,
            activity: build(ACTIVITY_TEMPLATE)?,
        })
    }
}

/// One bar per admitted identifier.
struct JobBar {
    bar: ProgressBar,
    indeterminate: bool,
}

impl JobBar {
    fn apply(&mut self, signal: ProgressSignal, styles: &Styles) {
        match signal {
            ProgressSignal::Percent(value) => self.bar.set_position(u64::from(value)),
            ProgressSignal::Activity(value) => {
                if !self.indeterminate {
                    self.bar.set_style(styles.activity.clone());
                    self.indeterminate = true;
                }
                self.bar.set_position(u64::from(value));
            }
        }
    }

    fn finish(&self, result: &JobResult) {
        match result.outcome {
            JobOutcome::Succeeded => {
                self.bar.set_position(100);
                self.bar.finish_with_message(format!("{} done", label(&result.id)));
            }
            JobOutcome::Cancelled => self
                .bar
                .abandon_with_message(format!("{} cancelled", label(&result.id))),
            JobOutcome::Failed(_) => self
                .bar
                .abandon_with_message(format!("{} failed: {}", label(&result.id), result.message)),
        }
    }
}

/// File-name part of an identifier for display.
fn label(id: &str) -> &str {
    let path = id.split(['?', '#']).next().unwrap_or(id);
    path.rsplit('/').next().unwrap_or(path)
}

/// Run the get command.
pub async fn run(config: ManagerConfig, ids: Vec<String>) -> Result<(), CliError> {
    let total = ids.len();
    let styles = Styles::new()?;
    let (manager, mut events) = DownloadManager::start(config)?;
    let manager = Arc::new(manager);
    manager.attach();

    let signal_manager = Arc::clone(&manager);
    ctrlc::set_handler(move || {
        for id in signal_manager.live_jobs() {
            signal_manager.cancel(&id);
        }
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let multi = MultiProgress::new();
    let mut bars: HashMap<String, JobBar> = HashMap::new();
    let mut outstanding: HashSet<String> = HashSet::new();
    let mut failed = 0;

    for id in &ids {
        if bars.contains_key(id) {
            continue;
        }
        if !manager.enqueue(id) {
            warn!(id = %id, "Rejected identifier");
            failed += 1;
            continue;
        }
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(styles.percent.clone());
        bar.set_message(label(id).to_string());
        bars.insert(
            id.clone(),
            JobBar {
                bar,
                indeterminate: false,
            },
        );
        outstanding.insert(id.clone());
    }

    if outstanding.is_empty() {
        manager.detach();
    }

    while let Some(event) = events.recv().await {
        match event {
            DownloadEvent::Progress(progress) => {
                if let Some(job) = bars.get_mut(&progress.id) {
                    job.apply(progress.signal, &styles);
                }
            }
            DownloadEvent::Finished(result) => {
                if let Some(job) = bars.get(&result.id) {
                    job.finish(&result);
                }
                if !result.is_success() {
                    failed += 1;
                }
                outstanding.remove(&result.id);
                if outstanding.is_empty() {
                    manager.detach();
                }
            }
            DownloadEvent::TeardownRequested => break,
        }
    }

    manager.shutdown().await;
    info!(total, failed, "All downloads settled");

    if failed > 0 {
        return Err(CliError::Incomplete { failed, total });
    }
    Ok(())
}
