use thiserror::Error;

/// Setup-time error for wrap plugin configuration.
///
/// Raised synchronously by [`crate::WrapPlugin::new`]; a misconfigured
/// instance never reaches the build.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid wrap configuration: {message}")]
    Config { message: String },

    #[error("unknown wrapper loader '{name}'")]
    UnknownLoader { name: String },
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
