// Domain models: device, group and system metrics plus the push envelope

mod device;
mod envelope;
mod group;
mod system;

pub use device::{DataSource, DeviceMetrics, DeviceMetricsPatch};
pub use envelope::{Envelope, EnvelopeKind};
pub use group::{GroupMetrics, MemberAggregate};
pub use system::{LedgerStats, SystemMetrics};

/// Current wall-clock time in epoch millis; 0 if the clock is before the epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
