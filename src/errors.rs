use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressorError {
    #[error("failed to decode source image: {0}")]
    Decode(String),

    #[error("failed to encode image as {mime}: {reason}")]
    Encode { mime: String, reason: String },

    #[error("quality must be between 10 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("no source image selected")]
    NoSource,
}

impl CompressorError {
    pub fn encode(mime: &mime::Mime, reason: impl Into<String>) -> Self {
        CompressorError::Encode {
            mime: mime.to_string(),
            reason: reason.into(),
        }
    }
}
