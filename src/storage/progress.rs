//! Transfer progress reporting.
//!
//! The ensure-available flow and the standalone transfer both emit
//! progress through a caller-supplied sink. Percentages follow a fixed
//! band layout so hosts can render one continuous bar across the whole
//! flow:
//!
//! - flow: 10% reachability probe, 30% transfer start, transfer
//!   internals re-mapped onto 30-90%, 100% on completion
//! - transfer: 5% existence check, 20-70% network fetch (linear by
//!   bytes when a total is known, flat midpoint otherwise), 70-95%
//!   upload, 100% on completion

use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Band constants
// ============================================================================

/// Flow progress while probing an existing durable-store URL.
pub const FLOW_PROBE_PERCENT: f64 = 10.0;

/// Flow progress when the transfer step begins.
pub const FLOW_TRANSFER_START_PERCENT: f64 = 30.0;

/// Factor mapping the transfer's internal 0-100% onto the flow band.
pub const FLOW_TRANSFER_SPAN: f64 = 0.6;

/// Transfer progress while checking for an existing stored object.
pub const TRANSFER_EXISTS_PERCENT: f64 = 5.0;

/// Transfer progress when the network fetch begins.
pub const TRANSFER_FETCH_PERCENT: f64 = 20.0;

/// Width of the fetch band when the payload size is known.
pub const TRANSFER_FETCH_SPAN: f64 = 50.0;

/// Flat fetch estimate when no total size is known.
pub const TRANSFER_FETCH_MIDPOINT: f64 = 25.0;

/// Transfer progress when the upload begins.
pub const TRANSFER_UPLOAD_PERCENT: f64 = 70.0;

/// Factor mapping the upload's internal 0-100% onto the transfer band.
pub const TRANSFER_UPLOAD_SPAN: f64 = 0.25;

/// Terminal progress for both the flow and the transfer.
pub const COMPLETE_PERCENT: f64 = 100.0;

// ============================================================================
// Types
// ============================================================================

/// Phase of a transfer as seen by progress consumers.
///
/// The built-in flow emits `Preparing`, `Uploading` and `Complete`;
/// `Processing` and `Failed` are part of the vocabulary for store
/// adapters that do their own post-processing or error signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Preparing,
    Uploading,
    Processing,
    Complete,
    Failed,
}

/// A single progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub phase: TransferPhase,
    pub percentage: f64,
    /// Bytes moved so far, when the emitting step tracks bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred: Option<u64>,
    /// Total bytes expected, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransferProgress {
    pub fn new(phase: TransferPhase, percentage: f64) -> Self {
        Self {
            phase,
            percentage,
            transferred: None,
            total: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_bytes(mut self, transferred: u64, total: Option<u64>) -> Self {
        self.transferred = Some(transferred);
        self.total = total;
        self
    }
}

/// Callback invoked with each progress report.
pub type ProgressSink = Arc<dyn Fn(TransferProgress) + Send + Sync>;

// ============================================================================
// Reporter
// ============================================================================

/// Wraps an optional sink and handles band re-mapping.
///
/// `scaled` derives a reporter whose emissions are linearly re-mapped
/// before forwarding, which is how the transfer's internal percentages
/// land inside the flow band (and the upload's inside the transfer
/// band). Scaling composes, so nesting reporters nests the bands.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Option<ProgressSink>,
}

impl ProgressReporter {
    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self { sink }
    }

    /// A reporter that drops every report.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn emit(&self, progress: TransferProgress) {
        if let Some(sink) = &self.sink {
            sink(progress);
        }
    }

    /// Derive a reporter that re-maps percentages as
    /// `offset + percentage * factor` before forwarding.
    pub fn scaled(&self, offset: f64, factor: f64) -> ProgressReporter {
        match &self.sink {
            None => ProgressReporter { sink: None },
            Some(sink) => {
                let sink = Arc::clone(sink);
                ProgressReporter {
                    sink: Some(Arc::new(move |mut progress: TransferProgress| {
                        progress.percentage = offset + progress.percentage * factor;
                        sink(progress);
                    })),
                }
            }
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}
