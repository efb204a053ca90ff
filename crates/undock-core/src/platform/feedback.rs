//! User-facing feedback sinks — notifications and audible cues.
//!
//! Both are fire-and-forget: a failure is logged and never affects the
//! pipeline.

use crate::runner::CommandRunner;
use std::sync::Arc;
use tracing::debug;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

pub trait Chime: Send + Sync {
    /// Play the named cue; `"eject"` is the only cue the core emits.
    fn play(&self, cue: &str);
}

/// Posts desktop notifications through the platform notifier command.
pub struct CommandNotifier {
    runner: Arc<dyn CommandRunner>,
}

impl CommandNotifier {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, body: &str) {
        let result = if cfg!(target_os = "macos") {
            // `{:?}` produces a double-quoted, escaped literal, which is
            // what AppleScript expects for string arguments.
            let script = format!("display notification {body:?} with title {title:?}");
            self.runner.run("osascript", &["-e", &script])
        } else {
            self.runner.run("notify-send", &[title, body])
        };
        if let Err(err) = result {
            debug!("notification not delivered: {err}");
        }
    }
}

/// Plays cues through the platform audio command.
pub struct CommandChime {
    runner: Arc<dyn CommandRunner>,
}

impl CommandChime {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Chime for CommandChime {
    fn play(&self, cue: &str) {
        let result = if cfg!(target_os = "macos") {
            let sound = match cue {
                "eject" => "Glass",
                other => other,
            };
            let path = format!("/System/Library/Sounds/{sound}.aiff");
            self.runner.run("afplay", &[&path])
        } else {
            let id = match cue {
                "eject" => "device-removed",
                other => other,
            };
            self.runner.run("canberra-gtk-play", &["--id", id])
        };
        if let Err(err) = result {
            debug!("audible cue not played: {err}");
        }
    }
}

/// Discards all feedback. Used headless and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentFeedback;

impl Notifier for SilentFeedback {
    fn notify(&self, _title: &str, _body: &str) {}
}

impl Chime for SilentFeedback {
    fn play(&self, _cue: &str) {}
}
