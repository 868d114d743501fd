//! Update lifecycle: parameters handed to the session when arming, events
//! coming back from it, and the tracker that reacts to them.
//!
//! One [`UpdateTracker`] is created per successful session arming, so its
//! progress counter starts from zero each time the subscription is
//! re-registered.

use crate::config::{DeviceIdentity, OtaParams};

/// Parameters passed to the update capability at subscribe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub title: &'static str,
    pub version: &'static str,
    pub retry_limit: u8,
    pub chunk_size: u16,
}

impl UpdateRequest {
    pub fn new(identity: &DeviceIdentity, params: &OtaParams) -> Self {
        Self {
            title: identity.title,
            version: identity.version,
            retry_limit: params.retry_limit,
            chunk_size: params.chunk_size,
        }
    }
}

/// Upper bound on update events a session may deliver from one `poll`.
pub const UPDATE_EVENTS_PER_POLL: usize = 32;

/// Lifecycle notifications from the update capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// `current` of `total` units transferred.
    Progress { current: u32, total: u32 },
    /// Terminal outcome.
    Completed { success: bool },
}

/// What the orchestrator must do in response to an [`UpdateEvent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateAction {
    /// Nothing to report this time.
    None,
    /// Send the progress attribute with this percentage.
    ReportProgress(f32),
    /// Hand control to the bootloader.
    Restart,
    /// Report the failure and keep running.
    ReportFailure,
}

/// Throttled progress reporter and completion handler.
#[derive(Debug, Clone, Copy)]
pub struct UpdateTracker {
    report_every: u32,
    calls: u32,
}

impl UpdateTracker {
    /// `report_every` of zero is treated as one (report every call).
    pub fn new(report_every: u32) -> Self {
        Self {
            report_every: report_every.max(1),
            calls: 0,
        }
    }

    pub fn on_event(&mut self, event: UpdateEvent) -> UpdateAction {
        match event {
            UpdateEvent::Progress { current, total } => self.on_progress(current, total),
            UpdateEvent::Completed { success: true } => UpdateAction::Restart,
            UpdateEvent::Completed { success: false } => UpdateAction::ReportFailure,
        }
    }

    /// Every `report_every`-th call yields a percentage; the counter then
    /// starts over.
    pub fn on_progress(&mut self, current: u32, total: u32) -> UpdateAction {
        self.calls += 1;
        if self.calls < self.report_every {
            return UpdateAction::None;
        }
        self.calls = 0;
        UpdateAction::ReportProgress(percent(current, total))
    }

    /// Calls counted since the last report.
    pub fn pending_calls(&self) -> u32 {
        self.calls
    }
}

fn percent(current: u32, total: u32) -> f32 {
    if total == 0 {
        0.0
    } else {
        (f64::from(current) * 100.0 / f64::from(total)) as f32
    }
}
