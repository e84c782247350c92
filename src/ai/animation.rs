// src/ai/animation.rs
use anyhow::{anyhow, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use super::connector::{AnimationGenerator, JobHandle, JobStatus, VideoJobApi, VideoPayload};
use super::error::remote_error;
use super::{AiError, API_KEY_HEADER};
use crate::capture::ImagePayload;
use crate::config::Config;
use crate::pipeline::RunToken;

/// Largest video we are willing to download (500 MB).
const MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Longest single sleep between cancellation checks.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(250);

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

// =============================================================================
// Veo REST client
// =============================================================================

/// Client for the long-running `predictLongRunning` video endpoint
pub struct VeoClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_name: String,
    aspect_ratio: String,
}

#[derive(Serialize)]
struct SubmitRequest {
    instances: Vec<Instance>,
    parameters: Parameters,
}

#[derive(Serialize)]
struct Instance {
    prompt: String,
    image: InstanceImage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    aspect_ratio: String,
    sample_count: u32,
}

#[derive(Deserialize)]
struct SubmitResponse {
    name: String,
}

#[derive(Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<Value>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl VeoClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        info!("Initializing video model: {} at {}", config.video_model, config.base_url);

        // No overall timeout: downloads of finished videos can be slow.
        let client = Client::builder()
            .timeout(None)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            model_name: config.video_model.clone(),
            aspect_ratio: config.aspect_ratio.clone(),
        })
    }

    fn submit_url(&self) -> String {
        format!("{}/models/{}:predictLongRunning", self.base_url, self.model_name)
    }

    fn poll_url(&self, job: &JobHandle) -> String {
        format!("{}/{}", self.base_url, job.0)
    }

    fn build_submit_request(&self, image: &ImagePayload, prompt: &str) -> SubmitRequest {
        SubmitRequest {
            instances: vec![Instance {
                prompt: prompt.to_string(),
                image: InstanceImage {
                    bytes_base64_encoded: image.to_base64(),
                    mime_type: image.mime_type().to_string(),
                },
            }],
            parameters: Parameters {
                aspect_ratio: self.aspect_ratio.clone(),
                sample_count: 1,
            },
        }
    }
}

impl VideoJobApi for VeoClient {
    fn submit(&self, image: &ImagePayload, prompt: &str) -> Result<JobHandle, AiError> {
        info!("Submitting animation job to {}", self.model_name);

        let response = self
            .client
            .post(self.submit_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.build_submit_request(image, prompt))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(remote_error(status, &body));
        }

        let submitted: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::RemoteCall(format!("unreadable job handle: {}", e)))?;
        info!("Animation job accepted: {}", submitted.name);
        Ok(JobHandle(submitted.name))
    }

    fn poll(&self, job: &JobHandle) -> Result<JobStatus, AiError> {
        let response = self
            .client
            .get(self.poll_url(job))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(Duration::from_secs(30))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(remote_error(status, &body));
        }

        parse_operation(&body)
    }

    fn fetch(&self, video_uri: &str) -> Result<VideoPayload, AiError> {
        info!("Downloading finished animation");

        let response = self
            .client
            .get(video_uri)
            .header(API_KEY_HEADER, &self.api_key)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(remote_error(status, &body));
        }

        if let Some(len) = response.content_length() {
            check_download_size(len, MAX_DOWNLOAD_BYTES)?;
        }

        let mime_type = video_mime_type(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = read_video(response, MAX_DOWNLOAD_BYTES)?;

        info!("Downloaded {} bytes of {}", bytes.len(), mime_type);
        Ok(VideoPayload { bytes, mime_type })
    }
}

/// MIME type of a downloaded video from its `Content-Type`, parameters
/// stripped. Anything that is not `video/*` is treated as mp4.
fn video_mime_type(content_type: Option<&str>) -> String {
    content_type
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| v.starts_with("video/"))
        .unwrap_or(DEFAULT_VIDEO_MIME)
        .to_string()
}

fn check_download_size(len: u64, limit: u64) -> Result<(), AiError> {
    if len > limit {
        return Err(AiError::GenerationFailed(format!(
            "video is {} bytes, more than the {} byte limit",
            len, limit
        )));
    }
    Ok(())
}

/// Read a video body, refusing empty bodies and anything over `limit` bytes
/// whatever the server declared.
fn read_video(body: impl Read, limit: u64) -> Result<Vec<u8>, AiError> {
    let mut bytes = Vec::new();
    body.take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| AiError::RemoteCall(format!("video download interrupted: {}", e)))?;
    if bytes.len() as u64 > limit {
        return Err(AiError::GenerationFailed(
            "video exceeds the download size limit".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(AiError::GenerationFailed("downloaded video is empty".to_string()));
    }
    Ok(bytes)
}

/// Map a long-running operation document onto a job status.
fn parse_operation(body: &str) -> Result<JobStatus, AiError> {
    let operation: Operation = serde_json::from_str(body)
        .map_err(|e| AiError::RemoteCall(format!("unreadable job status: {}", e)))?;

    if let Some(error) = operation.error {
        let message = error.message.unwrap_or_else(|| "unknown error".to_string());
        return Ok(JobStatus::Failed(match error.code {
            Some(code) => format!("{} (code {})", message, code),
            None => message,
        }));
    }

    if !operation.done {
        return Ok(JobStatus::Pending);
    }

    let generated = operation
        .response
        .as_ref()
        .map(|r| &r["generateVideoResponse"]);

    let video_uri = generated
        .and_then(|g| g["generatedSamples"][0]["video"]["uri"].as_str())
        .map(str::to_string);

    if video_uri.is_none() {
        let filtered: Vec<&str> = generated
            .and_then(|g| g["raiMediaFilteredReasons"].as_array())
            .map(|reasons| reasons.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !filtered.is_empty() {
            return Ok(JobStatus::Failed(format!(
                "video was filtered: {}",
                filtered.join("; ")
            )));
        }
    }

    Ok(JobStatus::Done { video_uri })
}

// =============================================================================
// Poll loop
// =============================================================================

/// Submits a job, polls it on a fixed interval until it ends, then downloads the result.
pub struct PollingGenerator<J> {
    api: J,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl<J: VideoJobApi> PollingGenerator<J> {
    pub fn new(api: J, poll_interval: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            api,
            poll_interval,
            max_wait,
        }
    }

    pub fn from_config(api: J, config: &Config) -> Self {
        Self::new(api, config.poll_interval, config.max_wait)
    }

    pub fn api(&self) -> &J {
        &self.api
    }

    fn wait_for_video(&self, job: &JobHandle, token: &RunToken) -> Result<String, AiError> {
        let started = Instant::now();
        let mut checks: u32 = 0;

        loop {
            if !pause(self.poll_interval, token) {
                return Err(AiError::Cancelled);
            }

            checks += 1;
            match self.api.poll(job)? {
                JobStatus::Pending => {
                    info!(
                        "Animation still rendering (check {}, {}s elapsed)",
                        checks,
                        started.elapsed().as_secs()
                    );
                    if let Some(max_wait) = self.max_wait {
                        if started.elapsed() >= max_wait {
                            warn!("Giving up on {} after {} checks", job.0, checks);
                            return Err(AiError::TimedOut(max_wait));
                        }
                    }
                }
                JobStatus::Done {
                    video_uri: Some(uri),
                } => {
                    info!("Animation finished after {} checks", checks);
                    return Ok(uri);
                }
                JobStatus::Done { video_uri: None } => {
                    return Err(AiError::GenerationFailed(
                        "the job finished without a video".to_string(),
                    ));
                }
                JobStatus::Failed(message) => return Err(AiError::GenerationFailed(message)),
            }
        }
    }
}

impl<J: VideoJobApi> AnimationGenerator for PollingGenerator<J> {
    fn generate(
        &self,
        image: &ImagePayload,
        animation_prompt: &str,
        token: &RunToken,
    ) -> Result<VideoPayload, AiError> {
        let job = self.api.submit(image, animation_prompt)?;
        let video_uri = self.wait_for_video(&job, token)?;

        if token.is_stale() {
            return Err(AiError::Cancelled);
        }
        self.api.fetch(&video_uri)
    }
}

/// Sleep for `duration`, waking regularly to check the token.
/// Returns false once the token is stale. A duration too large to put a
/// deadline on sleeps until the token goes stale.
fn pause(duration: Duration, token: &RunToken) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if token.is_stale() {
            return false;
        }
        let now = Instant::now();
        let remaining = match deadline {
            Some(deadline) if now >= deadline => return true,
            Some(deadline) => deadline - now,
            None => CANCEL_CHECK_SLICE,
        };
        thread::sleep(remaining.min(CANCEL_CHECK_SLICE));
    }
}
