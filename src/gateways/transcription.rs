//! HTTP client for the speech-to-text service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use super::{GatewayError, HttpConnector, TranscriptionGateway};
use crate::config::TranscriptionConfig;

const GATEWAY_NAME: &str = "transcription";

/// Hex-encoded SHA-256 of the audio payload
pub fn audio_checksum(audio: &[u8]) -> String {
    let digest = Sha256::digest(audio);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    transcriptions: String,
}

pub struct HttpTranscriptionGateway {
    connector: HttpConnector,
    endpoint: String,
}

impl HttpTranscriptionGateway {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            connector: HttpConnector::new(GATEWAY_NAME, &config.gateway)?,
            endpoint: config.transcribe_endpoint.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionGateway for HttpTranscriptionGateway {
    #[instrument(skip(self, audio), fields(size = audio.len()))]
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String, GatewayError> {
        if audio.is_empty() {
            return Err(GatewayError::invalid_input(
                GATEWAY_NAME,
                "empty audio data provided",
            ));
        }

        let checksum = audio_checksum(audio);
        info!(checksum = %checksum, "Transcribing audio");

        let build = || {
            Form::new()
                .part(
                    "file",
                    Part::bytes(audio.to_vec()).file_name(filename.to_string()),
                )
                .text("checksum", checksum.clone())
        };

        let response: TranscribeResponse =
            self.connector.post_multipart(&self.endpoint, build).await?;
        info!(length = response.transcriptions.len(), "Audio transcribed");
        Ok(response.transcriptions)
    }
}
