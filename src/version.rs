use crate::error::{DeepstreamError, Result};

/// Library release version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const VERSION_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");

/// The library's semantic version, e.g. `"0.1.0"`
pub fn version_to_string() -> &'static str {
    VERSION
}

/// Fail unless the library version equals `expected` exactly
pub fn check_version(expected: &str) -> Result<()> {
    let actual = version_to_string();
    if actual != expected {
        return Err(DeepstreamError::VersionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
