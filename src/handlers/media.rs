use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::warn;

use crate::llm::prompt::EncodedImage;

/// User-visible reply when a photo cannot be resolved or downloaded.
pub const APOLOGY_REPLY: &str =
    "I couldn't download that photo. Could you send it again?";

const DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const ERROR_BODY_LOG_LIMIT: usize = 800;
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("file resolution failed: {0}")]
    Resolve(String),
    #[error("file download failed: {0}")]
    Download(String),
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

async fn resolve_file_url(bot: &Bot, token: &str, file_id: &FileId) -> Result<String, MediaError> {
    let file = bot
        .get_file(file_id.clone())
        .await
        .map_err(|err| MediaError::Resolve(err.to_string()))?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        token, file.path
    ))
}

/// The download URL embeds the bot token, so errors are logged without it.
async fn download_bytes(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, MediaError> {
    let mut last_error = String::new();

    for attempt in 0..DOWNLOAD_MAX_ATTEMPTS {
        let response = match http.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "Failed to fetch photo bytes: {err} (timeout={}, connect={}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    attempt + 1,
                    DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = err.to_string();
                if !should_retry_error(&err) || attempt + 1 == DOWNLOAD_MAX_ATTEMPTS {
                    return Err(MediaError::Download(last_error));
                }
                let delay = Duration::from_millis(DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Photo download failed with status {}: {}",
                status,
                truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
            );
            last_error = format!("status {status}");
            if !should_retry_status(status) || attempt + 1 == DOWNLOAD_MAX_ATTEMPTS {
                return Err(MediaError::Download(last_error));
            }
            let delay = Duration::from_millis(DOWNLOAD_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        match response.bytes().await {
            Ok(bytes) => return Ok(bytes.to_vec()),
            Err(err) => {
                warn!(
                    "Failed to read photo bytes: {err} (attempt={}/{})",
                    attempt + 1,
                    DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = err.to_string();
                if attempt + 1 == DOWNLOAD_MAX_ATTEMPTS {
                    return Err(MediaError::Download(last_error));
                }
                let delay = Duration::from_millis(DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(MediaError::Download(last_error))
}

fn encode_image(bytes: &[u8]) -> EncodedImage {
    let mime_type = infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
    EncodedImage {
        mime_type,
        data: general_purpose::STANDARD.encode(bytes),
    }
}

/// Resolves a photo reference through the platform's file API, downloads the
/// bytes, and returns them base64-encoded and content-type tagged for inline
/// transmission to the model.
pub async fn fetch_photo(
    bot: &Bot,
    http: &reqwest::Client,
    token: &str,
    file_id: &FileId,
) -> Result<EncodedImage, MediaError> {
    let url = resolve_file_url(bot, token, file_id).await?;
    let bytes = download_bytes(http, &url).await?;
    Ok(encode_image(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_magic_bytes_are_tagged_as_jpeg() {
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01];
        let image = encode_image(&bytes);
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(!image.data.is_empty());
    }

    #[test]
    fn unrecognized_bytes_fall_back_to_the_fixed_tag() {
        let image = encode_image(b"definitely not an image");
        assert_eq!(image.mime_type, FALLBACK_MIME_TYPE);
    }

    #[test]
    fn encoded_payload_round_trips_through_base64() {
        let image = encode_image(&[1, 2, 3]);
        let decoded = general_purpose::STANDARD.decode(image.data).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }
}
