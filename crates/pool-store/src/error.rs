//! Object store errors

use thiserror::Error;

/// Errors that can occur when reading or writing the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the object changed since it was read,
    /// or because it already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other Kubernetes API or transport failure
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// Object is missing identifying metadata (name or namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether the error was a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ref response) if response.code == 404 => {
                StoreError::NotFound(response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                StoreError::Conflict(response.message.clone())
            }
            other => StoreError::Kube(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(StoreError::NotFound("x".to_string()).is_not_found());
        assert!(!StoreError::NotFound("x".to_string()).is_conflict());
        assert!(StoreError::Conflict("x".to_string()).is_conflict());
        assert!(!StoreError::Unavailable("x".to_string()).is_not_found());
    }

    #[test]
    fn test_only_not_found_and_conflict_are_classified() {
        let errors = [
            StoreError::NotFound("x".to_string()),
            StoreError::Conflict("x".to_string()),
            StoreError::InvalidObject("x".to_string()),
            StoreError::Unavailable("x".to_string()),
        ];
        for err in &errors {
            let expected = match err {
                StoreError::NotFound(_) => (true, false),
                StoreError::Conflict(_) => (false, true),
                StoreError::Kube(_) | StoreError::InvalidObject(_) | StoreError::Unavailable(_) => (false, false),
            };
            assert_eq!((err.is_not_found(), err.is_conflict()), expected, "{}", err);
        }
    }

    #[test]
    fn test_display_includes_message() {
        let err = StoreError::Conflict("the object has been modified".to_string());
        assert!(err.to_string().contains("the object has been modified"));
    }
}
