//! Notification sink that keeps every notification in memory.

use std::sync::{Mutex, PoisonError};

use territory_defense_core::{Notification, NotificationSink, NotifyError};

/// Sink that records published notifications in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the notifications recorded so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the notifications recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(
            &mut *self
                .notifications
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.notifications
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording sink poisoned".to_owned()))?
            .push(notification);
        Ok(())
    }
}
