//! Cloud face-comparison client: wire types, error taxonomy and the
//! bounded comparison fan-out.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

use kith_core::person::PersonId;

use crate::credentials::CloudCredentials;
use crate::sigv4::{self, SigningInput};

// --- Wire constants ---
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_COMPARE: &str = "RekognitionService.CompareFaces";
const TARGET_DETECT: &str = "RekognitionService.DetectFaces";

/// Default similarity floor passed to the API, on its 0 to 100 scale.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 80.0;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud matching not configured")]
    NotConfigured,
    #[error("frame could not be encoded as JPEG: {0}")]
    ImageEncodingFailed(String),
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
    #[error("api {status}: {kind}: {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("no face in reference image")]
    NoFaceDetected,
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bounds one comparison fan-out.
///
/// A probe against P people with N photos each costs up to P x N round
/// trips; the budget caps how long that may take and how many requests
/// run at once. Concurrency 1 keeps the round sequential.
#[derive(Debug, Clone, Copy)]
pub struct MatchBudget {
    pub time_budget: Duration,
    pub max_concurrency: usize,
}

impl Default for MatchBudget {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(12),
            max_concurrency: 1,
        }
    }
}

/// Best cloud candidate for a probe image.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudMatch {
    pub person_id: PersonId,
    /// Similarity as reported by the API, 0 to 100.
    pub similarity: f32,
}

/// Whether the cloud path can run at all, decided once at construction
/// instead of per call.
#[derive(Debug)]
pub enum CloudCapability {
    Available(CloudMatcher),
    Unavailable,
}

impl CloudCapability {
    /// Build from optional credentials; absent credentials mean the
    /// pipeline runs offline-only.
    pub fn from_credentials(creds: Option<CloudCredentials>) -> Self {
        match creds {
            Some(creds) => {
                tracing::info!(region = %creds.region, "cloud matching available");
                Self::Available(CloudMatcher::new(creds))
            }
            None => {
                tracing::warn!("cloud credentials missing, offline matching only");
                Self::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn matcher(&self) -> Result<&CloudMatcher, CloudError> {
        match self {
            Self::Available(matcher) => Ok(matcher),
            Self::Unavailable => Err(CloudError::NotConfigured),
        }
    }
}

/// Signed HTTP client for the face-comparison API.
#[derive(Debug)]
pub struct CloudMatcher {
    http: reqwest::Client,
    creds: CloudCredentials,
    endpoint: String,
    host: String,
}

impl CloudMatcher {
    pub fn new(creds: CloudCredentials) -> Self {
        let host = format!("rekognition.{}.amazonaws.com", creds.region);
        let endpoint = format!("https://{host}/");
        Self {
            http: reqwest::Client::new(),
            creds,
            endpoint,
            host,
        }
    }

    /// Point the matcher at a different endpoint. HTTP-level tests use
    /// this to talk to a local mock server.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = format!("{}/", endpoint.trim_end_matches('/'));
        self.host = authority_of(&self.endpoint);
        self
    }

    /// True when the API finds at least one face in the image.
    pub async fn detect_face(&self, image: &DynamicImage) -> Result<bool, CloudError> {
        let body = serde_json::to_vec(&DetectFacesRequest {
            image: WireImage {
                bytes: encode_jpeg(image)?,
            },
            attributes: ["DEFAULT"],
        })?;

        let (status, text) = self.call(TARGET_DETECT, body).await?;
        if status != 200 {
            return Err(api_error(status, &text));
        }

        let parsed: DetectFacesResponse = serde_json::from_str(&text)?;
        Ok(!parsed.face_details.is_empty())
    }

    /// Highest similarity between the faces in `source` and `target`.
    ///
    /// `Ok(None)` means the API answered but found no match at or above
    /// `threshold`.
    pub async fn compare_faces(
        &self,
        source: &DynamicImage,
        target: &DynamicImage,
        threshold: f32,
    ) -> Result<Option<f32>, CloudError> {
        let body = serde_json::to_vec(&CompareFacesRequest {
            source_image: WireImage {
                bytes: encode_jpeg(source)?,
            },
            target_image: WireImage {
                bytes: encode_jpeg(target)?,
            },
            similarity_threshold: threshold,
        })?;

        let (status, text) = self.call(TARGET_COMPARE, body).await?;
        if status != 200 {
            return Err(api_error(status, &text));
        }

        let parsed: CompareFacesResponse = serde_json::from_str(&text)?;
        let mut best: Option<f32> = None;
        for m in &parsed.face_matches {
            if best.map_or(true, |b| m.similarity > b) {
                best = Some(m.similarity);
            }
        }
        Ok(best)
    }

    /// Compare a probe against every reference photo of every candidate,
    /// keeping the best similarity seen anywhere.
    ///
    /// Reference photos the API rejects as faceless are skipped, not
    /// fatal. Once the time budget runs out the fan-out stops consuming
    /// pairs and reports the best result so far.
    pub async fn find_best_match(
        &self,
        probe: &DynamicImage,
        candidates: &[(PersonId, Vec<DynamicImage>)],
        threshold: f32,
        budget: MatchBudget,
    ) -> Result<Option<CloudMatch>, CloudError> {
        let deadline = tokio::time::Instant::now() + budget.time_budget;

        let comparisons: Vec<_> = candidates
            .iter()
            .flat_map(|(person, photos)| photos.iter().map(move |photo| (*person, photo)))
            .map(|(person, photo)| async move {
                (person, self.compare_faces(probe, photo, threshold).await)
            })
            .collect();

        let mut comparisons =
            stream::iter(comparisons).buffer_unordered(budget.max_concurrency.max(1));

        let mut best: Option<CloudMatch> = None;
        loop {
            let (person, outcome) = match tokio::time::timeout_at(deadline, comparisons.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        budget_ms = budget.time_budget.as_millis() as u64,
                        "match budget exhausted, reporting best so far"
                    );
                    break;
                }
            };

            match outcome {
                Ok(Some(similarity)) => {
                    if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                        best = Some(CloudMatch {
                            person_id: person,
                            similarity,
                        });
                    }
                }
                Ok(None) => {}
                Err(CloudError::NoFaceDetected) => {
                    tracing::debug!(person = %person, "reference photo without a face, skipped");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(best)
    }

    async fn call(&self, target: &str, body: Vec<u8>) -> Result<(u16, String), CloudError> {
        let signed = sigv4::sign(
            &SigningInput {
                host: &self.host,
                amz_target: target,
                content_type: CONTENT_TYPE,
                body: &body,
                timestamp: Utc::now(),
            },
            &self.creds,
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

// --- Wire types ---

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireImage {
    bytes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CompareFacesRequest {
    source_image: WireImage,
    target_image: WireImage,
    similarity_threshold: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectFacesRequest {
    image: WireImage,
    attributes: [&'static str; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompareFacesResponse {
    #[serde(default)]
    face_matches: Vec<FaceMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceMatch {
    similarity: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectFacesResponse {
    #[serde(default)]
    face_details: Vec<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(rename = "Message", alias = "message", default)]
    message: String,
}

/// Map a non-200 response onto the error taxonomy. The API reports a
/// reference image without a detectable face as an invalid parameter;
/// that case gets its own variant so callers can skip the photo.
fn api_error(status: u16, body: &str) -> CloudError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.kind.contains("InvalidParameterException") {
        return CloudError::NoFaceDetected;
    }
    let kind = if parsed.kind.is_empty() {
        "UnknownError".to_string()
    } else {
        parsed.kind
    };
    CloudError::Api {
        status,
        kind,
        message: parsed.message,
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<String, CloudError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .map_err(|e| CloudError::ImageEncodingFailed(e.to_string()))?;
    Ok(BASE64.encode(buf.into_inner()))
}

fn authority_of(endpoint: &str) -> String {
    let rest = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    rest.split('/').next().unwrap_or(rest).to_string()
}
