use super::Encoder;
use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use serde_json::{Value, json};
use std::io::Cursor;
use std::time::Duration;
use tracing::trace;
use ureq::AgentBuilder;
use vitrine_core::config::EmbeddingConfig;

/// Encoder backed by an HTTP embedding service.
///
/// Requests are `POST {endpoint}` with either
/// `{"model": .., "text": ".."}` or `{"model": .., "image": "<base64 PNG>"}`;
/// the response must carry `{"embedding": [f32, ..]}`.
pub struct HttpEncoder {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl HttpEncoder {
    #[must_use]
    pub fn new(cfg: &EmbeddingConfig) -> Self {
        let agent = AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        Self {
            agent,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            dimension: cfg.dimension,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, payload: &Value) -> Result<Vec<f32>> {
        trace!(endpoint = %self.endpoint, "embedding request");
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&payload.to_string())
            .map_err(|e| anyhow!("embedding service request failed: {e}"))?;

        let body: Value = response
            .into_json()
            .context("embedding service returned invalid JSON")?;
        parse_embedding(body)
    }
}

impl Encoder for HttpEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&json!({ "model": self.model, "text": text }))
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let png = encode_png_base64(image)?;
        self.request(&json!({ "model": self.model, "image": png }))
    }
}

fn encode_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image
        .to_rgb8()
        .write_to(&mut buf, ImageFormat::Png)
        .context("re-encode query image as PNG")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_embedding(value: Value) -> Result<Vec<f32>> {
    let Value::Object(mut map) = value else {
        bail!("embedding response is not a JSON object");
    };
    let Some(Value::Array(items)) = map.remove("embedding") else {
        bail!("embedding response has no `embedding` array");
    };

    items
        .into_iter()
        .map(|item| -> Result<f32> {
            let value = item
                .as_f64()
                .ok_or_else(|| anyhow!("non-numeric value in embedding"))?
                as f32;
            if !value.is_finite() {
                bail!("embedding value {item} is outside the f32 range");
            }
            Ok(value)
        })
        .collect()
}
