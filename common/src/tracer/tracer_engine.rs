use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

pub struct TracerOptions {
    /// Level applied to the stdout tracer when `RUST_LOG` does not say otherwise.
    pub default_level: LevelFilter,
    /// Whether the stdout tracer writes ANSI colour codes.
    pub ansi: bool,
}

impl TracerOptions {
    pub fn new(default_level: LevelFilter) -> Self {
        Self {
            default_level,
            ansi: true,
        }
    }
}

/// This object initialises the stdout tracer for the binary.
pub struct TracerEngine {
    filter_error: Option<String>,
}

impl TracerEngine {
    /// Initialises the stdout tracer for the binary.
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// #Returns
    /// An instance of TracerEngine
    pub fn new(options: TracerOptions) -> Self {
        let stdout_tracer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(options.ansi);

        // This filter is applied to the stdout tracer
        let (log_filter, filter_error) = match EnvFilter::builder()
            .with_default_directive(options.default_level.into())
            .from_env()
        {
            Ok(filter) => (filter, None),
            Err(e) => (
                EnvFilter::default().add_directive(options.default_level.into()),
                Some(e.to_string()),
            ),
        };

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        //  This is only called once, so will never panic
        tracing::subscriber::set_global_default(subscriber)
            .expect("tracing::subscriber::set_global_default should only be called once");

        Self { filter_error }
    }

    /// Returns a description of the `RUST_LOG` parse failure, if any occurred.
    pub fn get_filter_error(&self) -> Option<&str> {
        self.filter_error.as_deref()
    }
}
