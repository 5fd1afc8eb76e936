//! Embedding gateway: text and image queries to a single [`QueryVector`].
//!
//! The gateway decodes image bytes itself so a corrupt upload is reported as
//! [`EmbeddingError::InvalidImage`] (client error) before any model call,
//! while encoder failures and wrong-length vectors are
//! [`EmbeddingError::Model`] (server error).

mod http;

pub use http::HttpEncoder;

use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A joint text/image encoder producing vectors in one shared space.
pub trait Encoder: Send + Sync {
    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// Encode a non-empty text string.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    fn encode_text(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Encode a decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    fn encode_image(&self, image: &DynamicImage) -> anyhow::Result<Vec<f32>>;
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("no usable text or image input")]
    NoInput,
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("embedding model failed: {0}")]
    Model(String),
}

impl EmbeddingError {
    /// `true` when the caller supplied bad input rather than the model failing.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::NoInput | Self::InvalidImage(_))
    }
}

/// Immutable query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector(Arc<[f32]>);

impl QueryVector {
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values.into())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Unweighted element-wise mean of two vectors of equal length.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Model`] when the lengths differ.
    pub fn mean(a: &Self, b: &Self) -> Result<Self, EmbeddingError> {
        if a.dimension() != b.dimension() {
            return Err(EmbeddingError::Model(format!(
                "text and image vectors differ in dimension ({} vs {})",
                a.dimension(),
                b.dimension()
            )));
        }
        Ok(Self(
            a.0.iter()
                .zip(b.0.iter())
                .map(|(x, y)| (x + y) / 2.0)
                .collect(),
        ))
    }
}

/// Decode raw upload bytes, sniffing the format.
///
/// # Errors
///
/// Returns [`EmbeddingError::InvalidImage`] if the bytes are not a supported
/// image.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, EmbeddingError> {
    image::load_from_memory(bytes).map_err(|e| EmbeddingError::InvalidImage(e.to_string()))
}

/// Turns optional text and image input into one query vector.
#[derive(Clone)]
pub struct EmbeddingGateway {
    encoder: Arc<dyn Encoder>,
}

impl EmbeddingGateway {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    /// Embed text, an image, or both (averaged).
    ///
    /// Blank text counts as absent. The image is decoded before any model
    /// call.
    ///
    /// # Errors
    ///
    /// - [`EmbeddingError::NoInput`] when neither input is usable
    /// - [`EmbeddingError::InvalidImage`] when the image bytes do not decode
    /// - [`EmbeddingError::Model`] when encoding fails or returns a vector of
    ///   the wrong length
    pub fn embed(
        &self,
        text: Option<&str>,
        image: Option<&[u8]>,
    ) -> Result<QueryVector, EmbeddingError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let decoded = image.map(decode_image).transpose()?;

        match (text, decoded) {
            (None, None) => Err(EmbeddingError::NoInput),
            (Some(text), None) => self.text_vector(text),
            (None, Some(image)) => self.image_vector(&image),
            (Some(text), Some(image)) => {
                let text_vec = self.text_vector(text)?;
                let image_vec = self.image_vector(&image)?;
                debug!("combining text and image query vectors");
                QueryVector::mean(&text_vec, &image_vec)
            }
        }
    }

    /// Embed a text string.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Model`] on encoder failure or wrong length.
    pub fn text_vector(&self, text: &str) -> Result<QueryVector, EmbeddingError> {
        let raw = self
            .encoder
            .encode_text(text)
            .map_err(|e| EmbeddingError::Model(format!("{e:#}")))?;
        self.checked(raw)
    }

    /// Embed a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Model`] on encoder failure or wrong length.
    pub fn image_vector(&self, image: &DynamicImage) -> Result<QueryVector, EmbeddingError> {
        let raw = self
            .encoder
            .encode_image(image)
            .map_err(|e| EmbeddingError::Model(format!("{e:#}")))?;
        self.checked(raw)
    }

    fn checked(&self, raw: Vec<f32>) -> Result<QueryVector, EmbeddingError> {
        let expected = self.encoder.dimension();
        if raw.len() != expected {
            return Err(EmbeddingError::Model(format!(
                "expected {expected}-dimensional vector, got {}",
                raw.len()
            )));
        }
        if let Some(bad) = raw.iter().find(|v| !v.is_finite()) {
            return Err(EmbeddingError::Model(format!(
                "vector has a non-finite component ({bad})"
            )));
        }
        Ok(QueryVector::new(raw))
    }
}
