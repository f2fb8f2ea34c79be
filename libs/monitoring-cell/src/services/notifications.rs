// =====================================================================================
// NOTIFICATION SINKS
// =====================================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{NotificationRequest, NotifyError};
use shared_database::{tables, RecordStore, RecordStoreExt};
use shared_models::{Notification, NotificationStatus};
use shared_utils::Clock;

/// Where alert and reminder notifications are handed off for delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, request: NotificationRequest) -> Result<Notification, NotifyError>;
}

/// Queues notifications as PENDING rows for the delivery worker.
pub struct StoreNotificationSink {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    #[instrument(skip(self, request), fields(title = %request.title))]
    async fn send(&self, request: NotificationRequest) -> Result<Notification, NotifyError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            notification_type: request.notification_type,
            title: request.title,
            message: request.message,
            channels: request.channels,
            data: request.data,
            status: NotificationStatus::Pending,
            created_at: self.clock.now(),
        };

        let stored = self.store.insert_record(tables::NOTIFICATIONS, &notification).await?;
        info!(notification_id = %stored.id, "Notification queued");
        Ok(stored)
    }
}

/// Writes notifications to the log only.
pub struct LogNotificationSink {
    clock: Arc<dyn Clock>,
}

impl LogNotificationSink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, request: NotificationRequest) -> Result<Notification, NotifyError> {
        info!(
            notification_type = ?request.notification_type,
            user_id = ?request.user_id,
            "{}: {}", request.title, request.message
        );

        Ok(Notification {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            notification_type: request.notification_type,
            title: request.title,
            message: request.message,
            channels: request.channels,
            data: request.data,
            status: NotificationStatus::Sent,
            created_at: self.clock.now(),
        })
    }
}
