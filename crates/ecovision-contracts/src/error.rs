use thiserror::Error;

/// Every failure a scan can surface to the presentation layer.
///
/// Capture errors come from the camera boundary, the last two from the model boundary.
/// Callers show one notice per failure and never retry on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("camera access was denied")]
    PermissionDenied,

    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("camera stream is not ready")]
    NotReady,

    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    #[error("{schema} schema validation failed: {reason}")]
    SchemaValidation { schema: &'static str, reason: String },
}

impl ScanError {
    pub fn schema(schema: &'static str, reason: impl Into<String>) -> Self {
        Self::SchemaValidation {
            schema,
            reason: reason.into(),
        }
    }

    pub fn invocation(reason: impl Into<String>) -> Self {
        Self::ModelInvocation(reason.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::CameraUnavailable(_) => "camera_unavailable",
            Self::NotReady => "not_ready",
            Self::ModelInvocation(_) => "model_invocation_error",
            Self::SchemaValidation { .. } => "schema_validation_error",
        }
    }

    /// Single-line notice for the user. Model and schema failures read the same.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Could not access the camera. Please check permissions and try again."
            }
            Self::CameraUnavailable(_) => "Your device does not support camera access.",
            Self::NotReady => "The camera is still starting. Please wait a moment.",
            Self::ModelInvocation(_) | Self::SchemaValidation { .. } => {
                "Failed to classify the item. Please try again."
            }
        }
    }
}
