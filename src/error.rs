// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// Resource system error type
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Loading a resource's content failed (missing or malformed asset).
    /// Recoverable: the manager falls back to the type's dummy resource.
    LoadingError(String),

    /// Resource type was never registered with the manager
    UnregisteredType(String),

    /// Resource type was registered twice
    DuplicateType(String),

    /// Loader reported an empty resource id
    EmptyResourceId,

    /// Driver-side finalize step failed
    FinalizeError(String),

    /// Configuration parse error
    ConfigError(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::LoadingError(msg) => write!(f, "Loading error: {msg}"),
            ResourceError::UnregisteredType(name) => {
                write!(f, "Resource type not registered: {name}")
            }
            ResourceError::DuplicateType(name) => {
                write!(f, "Resource type registered twice: {name}")
            }
            ResourceError::EmptyResourceId => write!(f, "Loader reported an empty resource id"),
            ResourceError::FinalizeError(msg) => write!(f, "Finalize error: {msg}"),
            ResourceError::ConfigError(msg) => write!(f, "Config error: {msg}"),
            ResourceError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::IoError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ResourceError::LoadingError("bad png header".to_string());
        assert_eq!(err.to_string(), "Loading error: bad png header");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ResourceError = io.into();
        assert!(matches!(err, ResourceError::IoError(_)));
    }
}
