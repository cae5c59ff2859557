//! Metrics emitted by the write engine.
//!
//! Components describe what happened as an event struct and hand it to
//! [`emit!`](crate::emit); the event decides which `metrics` series it feeds.
//! Nothing is exported unless the host installs a `metrics` recorder.

pub mod events;

/// Emit an [`InternalEvent`](events::InternalEvent).
///
/// # Example
///
/// ```ignore
/// use flurry_core::emit;
/// use flurry_core::metrics::events::RecordsWritten;
///
/// emit!(RecordsWritten { count: 100, target: "users".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
