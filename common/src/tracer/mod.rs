mod tracer_engine;

pub use tracer_engine::{TracerEngine, TracerOptions};

/// Should be called once at the start of each binary.
/// The first parameter is the `LevelFilter` applied when `RUST_LOG` is unset or invalid.
#[macro_export]
macro_rules! init_tracer {
    ($level:expr) => {{
        let tracer =
            $crate::tracer::TracerEngine::new($crate::tracer::TracerOptions::new($level));
        // This is emitted here (in the macro) rather than by `TracerEngine::new`
        // so that the warning is attributed to the calling module.
        if let Some(e) = tracer.get_filter_error() {
            tracing::warn!("Invalid directive(s) in RUST_LOG: {e}");
        }
        tracer
    }};
}
