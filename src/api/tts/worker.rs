use serde::Deserialize;
use std::time::Duration;

use super::manager::Shared;
use super::types::{
    AudioItem, SpeechEvent, SynthesisRequest, CLIENT_TYPE, LANGUAGE, MAX_CLIP_BYTES,
    SYNTHESIS_URL,
};
use super::SpeechSynthesizer;
use crate::api::client::{build_agent, content_length, header_str, USER_AGENT};
use crate::config::AuthContext;
use crate::error::SpeakerError;

/// One fetch run: drain the text queue into the audio queue until the text
/// queue is empty or the audio queue is full. Never waits for either.
pub(crate) fn run_fetch(shared: &Shared) {
    while !shared.is_stopping() {
        if shared.audio_queue.is_full() {
            let pending = shared.text_queue.len();
            tracing::debug!(
                pending,
                capacity = shared.audio_queue.capacity(),
                "audio queue full, pausing fetch"
            );
            shared.emit(SpeechEvent::FetchDeferred { pending });
            return;
        }

        let Some(request) = shared.text_queue.pop() else {
            return;
        };

        match fetch_one(shared, &request) {
            Ok(item) => {
                let (id, bytes) = (item.id, item.data.len());
                if let Some(cache) = &shared.cache {
                    if let Err(e) = cache.store(&item) {
                        tracing::warn!(id, error = %e, "failed to cache clip");
                    }
                }
                // Only this worker pushes, and it checked capacity above
                if let Err(item) = shared.audio_queue.push(item) {
                    tracing::warn!(id = item.id, "audio queue filled unexpectedly, clip dropped");
                    continue;
                }
                tracing::debug!(id, bytes, "clip queued for playback");
                shared.emit(SpeechEvent::Fetched { id, bytes });
                shared.ensure_playback_worker_running();
            }
            Err(e) => {
                tracing::warn!(id = request.id, error = %e, "synthesis failed, dropping text");
                shared.emit(SpeechEvent::FetchFailed {
                    id: request.id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn fetch_one(shared: &Shared, request: &SynthesisRequest) -> Result<AudioItem, SpeakerError> {
    let auth = shared.session.read().auth()?;
    shared.synthesizer.synthesize(&auth, request)
}

/// Synthesizer backed by the Baidu `text2audio` REST endpoint
pub struct BaiduSynthesizer {
    agent: ureq::Agent,
    endpoint: String,
}

impl BaiduSynthesizer {
    pub fn new(timeout: Duration) -> Self {
        Self::with_endpoint(SYNTHESIS_URL, timeout)
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            endpoint: endpoint.to_string(),
        }
    }
}

impl SpeechSynthesizer for BaiduSynthesizer {
    fn synthesize(
        &self,
        auth: &AuthContext,
        request: &SynthesisRequest,
    ) -> Result<AudioItem, SpeakerError> {
        let url = synthesis_url(&self.endpoint, auth, request);
        let mut response = self
            .agent
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .send_empty()?;

        let status = response.status().as_u16();
        let content_type = header_str(&response, "content-type")
            .unwrap_or_default()
            .to_string();
        if content_length(&response) == Some(0) {
            return Err(SpeakerError::EmptyBody);
        }
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_CLIP_BYTES)
            .read_to_vec()?;

        audio_from_response(request, status, &content_type, body)
    }
}

pub fn synthesis_url(endpoint: &str, auth: &AuthContext, request: &SynthesisRequest) -> String {
    let params = &request.params;
    format!(
        "{}?lan={}&ctp={}&cuid={}&tok={}&tex={}&vol={}&per={}&spd={}&pit={}&aue={}",
        endpoint,
        LANGUAGE,
        CLIENT_TYPE,
        urlencoding::encode(&auth.client_id),
        urlencoding::encode(&auth.access_token),
        urlencoding::encode(&request.text),
        params.volume,
        params.voice.code(),
        params.speed,
        params.pitch,
        params.format.code()
    )
}

/// Error body returned with a JSON content type instead of audio
#[derive(Deserialize)]
struct SynthesisFault {
    err_no: i64,
    #[serde(default)]
    err_msg: String,
}

/// Classify a synthesis response: audio bytes, or why there are none.
pub fn audio_from_response(
    request: &SynthesisRequest,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
) -> Result<AudioItem, SpeakerError> {
    if content_type.contains("json") {
        let fault: SynthesisFault = serde_json::from_slice(&body)?;
        return Err(SpeakerError::SynthesisRejected {
            err_no: fault.err_no,
            err_msg: fault.err_msg,
        });
    }
    if !(200..300).contains(&status) {
        return Err(SpeakerError::Status(status));
    }
    if body.is_empty() {
        return Err(SpeakerError::EmptyBody);
    }
    Ok(AudioItem {
        id: request.id,
        text: request.text.clone(),
        format: request.params.format,
        data: body,
    })
}
