use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default dimensionality of the hashed term-frequency encoder.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Default request timeout for the HTTP encoder.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The black-box `encode(text) -> vector` capability.
///
/// Implementations must be deterministic for a fixed configuration: the
/// index is built and queried with the same encoder, and the cache assumes
/// that equal text yields equal vectors.
pub trait TextEncoder: Send + Sync {
    /// Stable identifier, mixed into the vector cache fingerprint so a
    /// change of encoder invalidates cached vectors.
    fn id(&self) -> String;

    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Deterministic hashed term-frequency encoder.
///
/// Hashes lowercase terms into fixed-dimension buckets weighted by term
/// frequency, L2-normalized. Not as semantically rich as a neural encoder,
/// but always available and fully offline; it is the default encoder and
/// the one used by the test suite.
#[derive(Debug, Clone)]
pub struct HashedTfEncoder {
    dimensions: usize,
}

impl Default for HashedTfEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashedTfEncoder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Hash a term into a bucket index using FNV-1a.
    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    /// Tokenize text into lowercase alphanumeric terms.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }
}

impl TextEncoder for HashedTfEncoder {
    fn id(&self) -> String {
        format!("hashed-tf/{}", self.dimensions)
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];

        // Weight longer terms up slightly; short terms are likely stopwords.
        let total = tokens.len().max(1) as f32;
        for token in &tokens {
            let weight = 1.0 + (token.len() as f32).ln();
            let bucket = Self::hash_term(token, self.dimensions);
            vector[bucket] += weight / total;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// HTTP encoder speaking the OpenAI-compatible `/v1/embeddings` protocol.
pub struct HttpEncoder {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEncoder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::Encoder(format!("cannot build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

impl TextEncoder for HttpEncoder {
    fn id(&self) -> String {
        format!("http/{}/{}", self.base_url, self.model)
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| Error::Encoder("empty embedding response".into()))
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| Error::Encoder(format!("request failed: {e}")))?;

        let parsed: EmbeddingApiResponse = response
            .json()
            .map_err(|e| Error::Encoder(format!("malformed response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Encoder(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|d| {
                let mut vector = d.embedding;
                l2_normalize(&mut vector);
                vector
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_zero_vector() {
        let encoder = HashedTfEncoder::new(64);
        let v = encoder.encode("").unwrap();
        assert_eq!(v.len(), 64);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn encoding_is_deterministic() {
        let encoder = HashedTfEncoder::new(128);
        let a = encoder.encode("Juliet is the sun").unwrap();
        let b = encoder.encode("Juliet is the sun").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vectors_are_unit_length() {
        let encoder = HashedTfEncoder::default();
        let v = encoder.encode("arise fair sun and kill the envious moon").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn word_order_is_ignored() {
        let encoder = HashedTfEncoder::new(256);
        let a = encoder.encode("the sun is Juliet").unwrap();
        let b = encoder.encode("Juliet is the sun").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_texts_differ() {
        let encoder = HashedTfEncoder::new(256);
        let a = encoder.encode("Juliet is the sun").unwrap();
        let b = encoder.encode("a plague on both your houses").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn batch_matches_single() {
        let encoder = HashedTfEncoder::new(64);
        let texts =
            vec!["parting is sweet sorrow".to_string(), "wherefore art thou".to_string()];
        let batch = encoder.encode_batch(&texts).unwrap();
        assert_eq!(batch[0], encoder.encode(&texts[0]).unwrap());
        assert_eq!(batch[1], encoder.encode(&texts[1]).unwrap());
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0f32; 8];
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn encoder_ids_are_distinct() {
        let a = HashedTfEncoder::new(64);
        let b = HashedTfEncoder::new(128);
        assert_ne!(a.id(), b.id());
    }
}
