//! Result type alias for configuration loading operations

use crate::error::ConfigFileError;

/// Standard Result type for configuration loading operations
pub type Result<T> = std::result::Result<T, ConfigFileError>;

/// Extension trait for turning "file does not exist" into an absent value
pub trait ResultExt<T> {
    /// `Ok(Some)` on success, `Ok(None)` when the file was not found,
    /// every other error unchanged
    fn not_found_as_none(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn not_found_as_none(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => {
                tracing::debug!("Treating missing file as absent: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_not_found_as_none() {
        let missing: Result<u32> = Err(ConfigFileError::file_not_found("/missing.json"));
        assert!(matches!(missing.not_found_as_none(), Ok(None)));

        let present: Result<u32> = Ok(7);
        assert_eq!(present.not_found_as_none().unwrap(), Some(7));

        let cycle: Result<u32> = Err(ConfigFileError::cycle_detected(Path::new("/a.json")));
        assert!(cycle.not_found_as_none().is_err());
    }
}
