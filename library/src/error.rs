use thiserror::Error;

/// Result of fallible operations performed against the platform (signaling transport,
/// peer connection, media devices).
pub type Result<T> = anyhow::Result<T>;

/// Reason local capture could not be obtained.
///
/// Surfaced to the UI through [`CallView::media_error`](crate::CallView::media_error);
/// negotiation simply does not proceed past the gatekeeper.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MediaError {
    #[error("camera or microphone access was denied: {0}")]
    PermissionDenied(String),
    #[error("camera or microphone is unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("media capture is not supported in this environment")]
    Unsupported,
}

impl MediaError {
    /// Classify a `DOMException` name returned by `getUserMedia` / `getDisplayMedia`.
    #[must_use]
    pub fn from_dom_exception(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                Self::PermissionDenied(message.to_owned())
            }
            "NotSupportedError" | "TypeError" => Self::Unsupported,
            _ => Self::DeviceUnavailable(message.to_owned()),
        }
    }
}
