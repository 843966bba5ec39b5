//! # Reader Events
//!
//! The reader answers every command through callbacks. Instead of keeping a
//! set of nullable listener slots, every callback pushes one [`ScanEvent`]
//! onto a single channel that the station drains in order.
//!
//! ```text
//! ┌──────────────┐   on_single_tag_read(..)   ┌──────────────────────────┐
//! │ Reader SDK / │ ─────────────────────────► │ DeviceCallbacks          │
//! │ simulator    │   on_write_result(..)      │  (UnboundedSender)       │
//! └──────────────┘                            └────────────┬─────────────┘
//!                                                          │ ScanEvent
//!                                                          ▼
//!                                             ScanStation (one consumer)
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// One result delivered by the reader. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Continuous inventory hit.
    InventoryTag { epc: String },
    /// Single-shot UHF read result.
    TagRead { epc: String, tid: Option<String> },
    /// Single-shot read (UHF or barcode) produced nothing.
    ReadFailed { reason: String },
    /// Single-shot barcode result.
    BarcodeRead { code: String },
    /// Continuous inventory ended on its own.
    InventoryFinished,
    /// A stop request was acknowledged.
    OperationStopped,
    WriteResult {
        success: bool,
        epc: Option<String>,
        error: Option<String>,
    },
    LockResult {
        success: bool,
        error: Option<String>,
    },
    /// Unrecoverable fault, applicable to any operation.
    DeviceError { message: String },
}

impl ScanEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::InventoryTag { .. } => "inventory_tag",
            ScanEvent::TagRead { .. } => "tag_read",
            ScanEvent::ReadFailed { .. } => "read_failed",
            ScanEvent::BarcodeRead { .. } => "barcode_read",
            ScanEvent::InventoryFinished => "inventory_finished",
            ScanEvent::OperationStopped => "operation_stopped",
            ScanEvent::WriteResult { .. } => "write_result",
            ScanEvent::LockResult { .. } => "lock_result",
            ScanEvent::DeviceError { .. } => "device_error",
        }
    }
}

/// The callback surface handed to a reader driver.
///
/// Cloneable and usable from any thread. Events sent after the station has
/// stopped are dropped.
#[derive(Debug, Clone)]
pub struct DeviceCallbacks {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl DeviceCallbacks {
    /// Creates the callback surface and the receiver the station drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DeviceCallbacks { tx }, rx)
    }

    /// Pushes a raw event.
    pub fn emit(&self, event: ScanEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            debug!(kind, "Reader event dropped, station stopped");
        }
    }

    pub fn on_uhf_tag_scanned(&self, epc: impl Into<String>) {
        self.emit(ScanEvent::InventoryTag { epc: epc.into() });
    }

    pub fn on_single_tag_read(&self, epc: impl Into<String>, tid: Option<String>) {
        self.emit(ScanEvent::TagRead {
            epc: epc.into(),
            tid,
        });
    }

    pub fn on_single_tag_read_failed(&self, reason: impl Into<String>) {
        self.emit(ScanEvent::ReadFailed {
            reason: reason.into(),
        });
    }

    pub fn on_barcode_scanned(&self, code: impl Into<String>) {
        self.emit(ScanEvent::BarcodeRead { code: code.into() });
    }

    pub fn on_inventory_finished(&self) {
        self.emit(ScanEvent::InventoryFinished);
    }

    pub fn on_operation_stopped(&self) {
        self.emit(ScanEvent::OperationStopped);
    }

    pub fn on_write_result(&self, success: bool, epc: Option<String>, error: Option<String>) {
        self.emit(ScanEvent::WriteResult {
            success,
            epc,
            error,
        });
    }

    pub fn on_lock_result(&self, success: bool, error: Option<String>) {
        self.emit(ScanEvent::LockResult { success, error });
    }

    pub fn on_device_error(&self, message: impl Into<String>) {
        self.emit(ScanEvent::DeviceError {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callbacks_preserve_order() {
        let (callbacks, mut rx) = DeviceCallbacks::channel();
        callbacks.on_barcode_scanned("B001");
        callbacks.on_write_result(false, None, Some("timeout".into()));
        callbacks.on_operation_stopped();

        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::BarcodeRead {
                code: "B001".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap().kind(), "write_result");
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::OperationStopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (callbacks, rx) = DeviceCallbacks::channel();
        drop(rx);
        // Must not panic
        callbacks.on_device_error("reader unplugged");
    }
}
