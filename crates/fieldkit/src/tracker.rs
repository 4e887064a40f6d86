use std::sync::Arc;

use fieldkit_fetch::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;

const PB_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {wide_msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

/// Terminal bar fed by absolute byte offsets from the acquisition engine.
#[derive(Clone)]
pub struct TransferTracker {
    pb: ProgressBar,
}

impl TransferTracker {
    pub fn new(prefix: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        pb.set_prefix(prefix.to_string());
        Self { pb }
    }

    pub fn update(&self, done: u64, total: Option<u64>) {
        if let Some(total) = total {
            if self.pb.length() != Some(total) {
                self.pb.set_length(total);
            }
        }
        self.pb.set_position(done);
    }

    pub fn sink(&self) -> ProgressSink {
        let tracker = self.clone();
        Arc::new(move |done: u64, total: Option<u64>| tracker.update(done, total))
    }

    pub fn finish(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self, msg: &str) {
        self.pb.abandon_with_message(msg.to_string());
    }
}
