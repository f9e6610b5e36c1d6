/// Errors raised by the lesion analysis core.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("Failed to encode annotated image: {0}")]
    Encode(#[source] image::ImageError),
}

impl AnalysisError {
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }
}
