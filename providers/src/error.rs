use resource_agent::error::RegistryError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid timeout override for '{}': {}", resource_type, source))]
    TimeoutOverride {
        resource_type: &'static str,
        source: reconcile_model::Error,
    },

    #[snafu(display("Unable to register resource type: {}", source))]
    Register { source: RegistryError },
}

pub type Result<T> = std::result::Result<T, Error>;
