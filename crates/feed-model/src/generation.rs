//! Contract with the remote video-generation service.
//!
//! The service itself is external; this module fixes the request/response
//! shapes and the three-way failure classification the UI depends on.

use serde::{Deserialize, Serialize};

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

/// How the prompt is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    TextToVideo,
    ImageToVideo,
    /// Start and end frames supplied as references.
    FramesToVideo,
    /// Style/subject reference images.
    ReferencesToVideo,
    /// Extend an existing generated video.
    ExtendVideo,
}

/// An inline reference image.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("mime_type", &self.mime_type)
            .field("data", &self.data.len())
            .finish()
    }
}

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model_id: String,
    pub aspect_ratio: AspectRatio,
    /// Resolution tag such as `"720p"` or `"1080p"`.
    pub resolution: String,
    pub mode: GenerationMode,
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
}

/// A finished generation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Where the service left the video.
    pub output_uri: String,
    /// The downloaded video bytes.
    pub raw_bytes: Vec<u8>,
}

impl std::fmt::Debug for GenerationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationResponse")
            .field("output_uri", &self.output_uri)
            .field("raw_bytes", &self.raw_bytes.len())
            .finish()
    }
}

/// Opaque failure reported by the service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        classify_failure(&self.message)
    }
}

/// User-facing category of a generation failure. Each drives a different
/// affordance (billing link, prompt edit, retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    AuthOrBilling,
    ContentSafety,
    Generic,
}

impl FailureKind {
    pub fn user_hint(&self) -> &'static str {
        match self {
            FailureKind::AuthOrBilling => {
                "Your API key is missing, invalid, or not enabled for billing. Check your key and billing settings."
            }
            FailureKind::ContentSafety => {
                "The prompt was blocked by content safety filters. Try rephrasing it."
            }
            FailureKind::Generic => "Video generation failed. Please try again.",
        }
    }
}

const AUTH_BILLING_PATTERNS: &[&str] = &[
    "api key",
    "api_key",
    "billing",
    "permission denied",
    "permission_denied",
    "unauthenticated",
    "unauthorized",
    "requested entity was not found",
    "quota",
    "401",
    "403",
];

const SAFETY_PATTERNS: &[&str] = &[
    "safety",
    "blocked",
    "prohibited",
    "responsible ai",
    "content policy",
    "violat",
];

/// Pattern-match an opaque error message into a [`FailureKind`].
///
/// Auth/billing wins over safety when both match, since the user cannot act
/// on a safety hint without a working key.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if AUTH_BILLING_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::AuthOrBilling
    } else if SAFETY_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::ContentSafety
    } else {
        FailureKind::Generic
    }
}

/// The remote generation collaborator.
#[async_trait::async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_and_billing() {
        for msg in [
            "API key not valid. Please pass a valid API key.",
            "Requested entity was not found.",
            "403 PERMISSION_DENIED",
            "Billing account required",
        ] {
            assert_eq!(classify_failure(msg), FailureKind::AuthOrBilling, "{msg}");
        }
    }

    #[test]
    fn classifies_safety_blocks() {
        assert_eq!(
            classify_failure("Generation blocked due to SAFETY"),
            FailureKind::ContentSafety
        );
        assert_eq!(
            classify_failure("Prompt violates usage guidelines"),
            FailureKind::ContentSafety
        );
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(classify_failure("deadline exceeded"), FailureKind::Generic);
        assert_eq!(
            GenerationError::new("internal error").kind(),
            FailureKind::Generic
        );
    }

    #[test]
    fn aspect_ratio_uses_ratio_strings() {
        assert_eq!(
            serde_json::to_string(&AspectRatio::Portrait).unwrap(),
            "\"9:16\""
        );
    }

    struct EchoGenerator;

    #[async_trait::async_trait]
    impl VideoGenerator for EchoGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, GenerationError> {
            if request.prompt.is_empty() {
                return Err(GenerationError::new("empty prompt blocked"));
            }
            Ok(GenerationResponse {
                output_uri: format!("memory://{}", request.model_id),
                raw_bytes: request.prompt.as_bytes().to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn generator_trait_is_object_safe() {
        let generator: Box<dyn VideoGenerator> = Box::new(EchoGenerator);
        let mut request = GenerationRequest {
            prompt: "waves".to_string(),
            model_id: "m1".to_string(),
            aspect_ratio: AspectRatio::Landscape,
            resolution: "720p".to_string(),
            mode: GenerationMode::TextToVideo,
            reference_images: vec![],
        };
        let response = generator.generate(&request).await.unwrap();
        assert_eq!(response.output_uri, "memory://m1");

        request.prompt.clear();
        let err = generator.generate(&request).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ContentSafety);
    }
}
