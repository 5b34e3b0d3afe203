//! Progress reporting for a followed mission

use crate::output::console::status_label;
use colored::Colorize;
use futures::{Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use overmind_application::{ProgressKind, ProgressLine};
use overmind_domain::MissionStatus;
use std::time::Duration;

/// Receives the lines of a mission's progress stream
pub trait ProgressView {
    fn on_line(&self, line: &ProgressLine);
}

/// Drains `stream` into `view` and returns the line that ended it.
pub async fn follow<S>(stream: S, view: &dyn ProgressView) -> Option<ProgressLine>
where
    S: Stream<Item = ProgressLine>,
{
    let mut stream = std::pin::pin!(stream);
    let mut last = None;
    while let Some(line) = stream.next().await {
        view.on_line(&line);
        last = Some(line);
    }
    last
}

/// Spinner that shows the latest status line and prints each change above it
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(Self::spinner_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("Waiting for a worker...");
        Self { bar }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressView for ProgressReporter {
    fn on_line(&self, line: &ProgressLine) {
        if let Some(status) = line.status {
            self.bar.set_prefix(status_label(status).to_string());
        }
        match line.kind {
            ProgressKind::Update => {
                self.bar.println(format!("{} {}", "->".cyan(), line.text));
                self.bar.set_message(line.text.clone());
            }
            ProgressKind::Terminal => {
                let mark = match line.status {
                    Some(MissionStatus::Success) => "v".green(),
                    _ => "x".red(),
                };
                self.bar.finish_with_message(format!("{} {}", mark, line.text));
            }
            ProgressKind::Background | ProgressKind::Unavailable => {
                self.bar
                    .finish_with_message(format!("{} {}", "!".yellow(), line.text));
            }
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl ProgressView for SimpleProgress {
    fn on_line(&self, line: &ProgressLine) {
        let marker = match line.kind {
            ProgressKind::Update => "->".cyan(),
            ProgressKind::Terminal => "==".bold(),
            ProgressKind::Background | ProgressKind::Unavailable => "!!".yellow(),
        };
        println!("{} {}", marker, line.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use overmind_domain::MissionId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl ProgressView for Recorder {
        fn on_line(&self, line: &ProgressLine) {
            self.lines.lock().unwrap().push(line.text.clone());
        }
    }

    fn line(kind: ProgressKind, status: MissionStatus, text: &str) -> ProgressLine {
        ProgressLine {
            mission_id: MissionId::new(1),
            kind,
            status: Some(status),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_follow_returns_final_line() {
        let recorder = Recorder::default();
        let lines = vec![
            line(ProgressKind::Update, MissionStatus::Planning, "planning"),
            line(ProgressKind::Update, MissionStatus::Running, "running"),
            line(ProgressKind::Terminal, MissionStatus::Success, "done"),
        ];

        let last = follow(stream::iter(lines), &recorder).await.unwrap();

        assert_eq!(last.kind, ProgressKind::Terminal);
        assert_eq!(
            *recorder.lines.lock().unwrap(),
            vec!["planning", "running", "done"]
        );
    }

    #[tokio::test]
    async fn test_follow_empty_stream() {
        let recorder = Recorder::default();
        assert!(follow(stream::empty(), &recorder).await.is_none());
        assert!(recorder.lines.lock().unwrap().is_empty());
    }
}
