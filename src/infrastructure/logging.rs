use crate::infrastructure::error::InfraError;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide fmt subscriber. `RUST_LOG` takes precedence over
/// `default_directive`.
pub fn init_logging(default_directive: &str) -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|error| {
            InfraError::InvalidConfig(format!("invalid log directive '{default_directive}': {error}"))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("logging already initialized: {error}")))
}
