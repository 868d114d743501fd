//! Bounded hand-off from the MQTT client task to the gateway loop.
//!
//! The ESP-IDF MQTT client delivers events on its own FreeRTOS task.  The
//! callback only pushes into this channel; `SessionPort::poll` drains it
//! on the loop thread, so no gateway state is ever touched concurrently.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Maximum events buffered between two polls.
pub const INBOX_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Connected,
    Disconnected,
    Message { topic: String, payload: Vec<u8> },
}

pub struct Inbox {
    channel: Channel<CriticalSectionRawMutex, InboundEvent, INBOX_DEPTH>,
    dropped: AtomicU32,
}

impl Inbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Non-blocking push from the producer side.  A full inbox drops the
    /// event and counts it.
    pub fn push(&self, event: InboundEvent) -> bool {
        if self.channel.try_send(event).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Non-blocking pop from the loop side.
    pub fn pop(&self) -> Option<InboundEvent> {
        self.channel.try_receive().ok()
    }

    /// Events lost to a full inbox since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
