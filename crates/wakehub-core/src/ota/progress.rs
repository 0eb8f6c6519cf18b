//! Notification throttling
//!
//! Two layers: [`ProgressThrottle`] decides which download progress values
//! are worth reporting, [`StatusReporter`] debounces everything that is not
//! forced.

use super::OtaStatus;
use crate::clock::elapsed_ms;

/// Report at least every this many percent
pub const PROGRESS_STEP_PERCENT: u8 = 5;

/// Report at least this often while bytes arrive
pub const PROGRESS_INTERVAL_MS: u32 = 2_000;

/// Minimum spacing of unforced notifications
pub const NOTIFY_DEBOUNCE_MS: u32 = 300;

/// Callback receiving every emitted status snapshot
pub type OtaNotifier = Box<dyn FnMut(&OtaStatus) + Send>;

/// Picks the download progress values to report
#[derive(Debug, Clone, Default)]
pub struct ProgressThrottle {
    last_percent: Option<u8>,
    last_at: u32,
}

impl ProgressThrottle {
    /// Start a new transfer
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` to skip, `Some(forced)` to report
    ///
    /// 0 % (first value) and 100 % are forced; otherwise a value is reported
    /// after a 5 % step or 2 s, whichever comes first.
    pub fn observe(&mut self, percent: u8, now: u32) -> Option<bool> {
        let forced = match self.last_percent {
            None => percent == 0 || percent >= 100,
            Some(last) => percent >= 100 && last < 100,
        };

        let report = forced
            || match self.last_percent {
                None => true,
                Some(last) => {
                    percent >= last.saturating_add(PROGRESS_STEP_PERCENT)
                        || elapsed_ms(now, self.last_at) >= PROGRESS_INTERVAL_MS
                }
            };

        if !report {
            return None;
        }
        self.last_percent = Some(percent);
        self.last_at = now;
        Some(forced)
    }
}

/// Delivers status snapshots to the notifier with a debounce
#[derive(Default)]
pub struct StatusReporter {
    notifier: Option<OtaNotifier>,
    last_emit_at: Option<u32>,
}

impl StatusReporter {
    /// Reporter without a notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the notifier
    pub fn set_notifier(&mut self, notifier: OtaNotifier) {
        self.notifier = Some(notifier);
    }

    /// Emit `status`; unforced calls within the debounce window are dropped
    ///
    /// Returns whether the notifier was called.
    pub fn emit(&mut self, status: &OtaStatus, now: u32, forced: bool) -> bool {
        if !forced {
            if let Some(last) = self.last_emit_at {
                if elapsed_ms(now, last) < NOTIFY_DEBOUNCE_MS {
                    return false;
                }
            }
        }
        self.last_emit_at = Some(now);
        match self.notifier.as_mut() {
            Some(notify) => {
                notify(status);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("has_notifier", &self.notifier.is_some())
            .field("last_emit_at", &self.last_emit_at)
            .finish()
    }
}
