//! Rendering of image pull progress.

use std::collections::HashMap;
use std::io::IsTerminal;

use build_sandbox::PullProgressEvent;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One line per event, for logs and non-interactive terminals.
pub fn plain_line(event: &PullProgressEvent) -> String {
    if event.layer_id.is_empty() {
        format!("\t{}", event.status)
    } else {
        format!(
            "\t{} id:{} progress:{}%",
            event.status,
            event.layer_id,
            event.percentage()
        )
    }
}

/// Only events carrying a byte count get a bar.
fn has_byte_count(event: &PullProgressEvent) -> bool {
    !event.layer_id.is_empty() && event.bytes_total > 0
}

/// Draws pull progress: a bar per layer on a terminal, plain lines elsewhere.
pub struct PullRenderer {
    bars: Option<MultiProgress>,
    layers: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl PullRenderer {
    pub fn new() -> Self {
        let interactive = std::io::stderr().is_terminal();
        Self::with_target(interactive)
    }

    fn with_target(interactive: bool) -> Self {
        let bars = interactive.then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr()));
        let style = ProgressStyle::with_template("{prefix:>14} {msg:<20} [{bar:30}] {percent:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            bars,
            layers: HashMap::new(),
            style,
        }
    }

    pub fn render(&mut self, event: &PullProgressEvent) {
        let Some(bars) = &self.bars else {
            eprintln!("{}", plain_line(event));
            return;
        };

        if !has_byte_count(event) {
            match self.layers.get(&event.layer_id) {
                // No byte count on a known layer: it is done.
                Some(bar) => {
                    bar.set_message(event.status.clone());
                    bar.set_position(u64::from(event.percentage()));
                }
                None => {
                    let _ = bars.println(plain_line(event).trim_start());
                }
            }
            return;
        }

        let bar = self.layers.entry(event.layer_id.clone()).or_insert_with(|| {
            let bar = bars.add(ProgressBar::new(100));
            bar.set_style(self.style.clone());
            bar.set_prefix(event.layer_id.clone());
            bar
        });
        bar.set_message(event.status.clone());
        bar.set_position(u64::from(event.percentage()));
    }

    /// Complete every bar; `ok` marks them finished rather than abandoned.
    pub fn finish(&mut self, ok: bool) {
        for bar in self.layers.values() {
            if ok {
                bar.finish();
            } else {
                bar.abandon();
            }
        }
        self.layers.clear();
    }

    #[cfg(test)]
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[cfg(test)]
    fn position(&self, layer: &str) -> Option<u64> {
        self.layers.get(layer).map(ProgressBar::position)
    }
}

impl Default for PullRenderer {
    fn default() -> Self {
        Self::new()
    }
}
