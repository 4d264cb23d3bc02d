//! Caption suggestions over the generateContent HTTP API. Never fails: any error yields
//! a fallback list.

use std::time::Duration;

use base64::Engine as _;
use kenar_core::{CaptionSuggester, ImageRef};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const PROMPT: &str = "You write short, witty, poetic social media captions. \
Look at this image and suggest 3 caption options. \
Answer with a JSON object with a single key \"captions\" holding an array of strings. \
Example: {\"captions\": [\"first\", \"second\", \"third\"]}";

/// Used when the model answers but without a captions array.
pub const DEFAULT_CAPTIONS: [&str; 3] = ["A beautiful day!", "Moments...", "A memory to keep"];

#[derive(Clone)]
pub struct HttpCaptionSuggester {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    /// Returned on transport or parse errors.
    error_fallback: Vec<String>,
}

impl HttpCaptionSuggester {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        error_fallback: Vec<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            error_fallback,
        }
    }

    async fn request(&self, image: &ImageRef) -> Result<Vec<String>, SuggestError> {
        let key = self.api_key.as_deref().ok_or(SuggestError::NoApiKey)?;
        let (mime_type, data) = split_data_url(image.as_str())?;
        let url = format!(
            "{}/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": mime_type, "data": data } },
                    { "text": PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.8
            }
        });
        let resp: GenerateResponse = self
            .client
            .post(url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let text = resp.first_text().ok_or(SuggestError::EmptyResponse)?;
        match parse_captions(&text)? {
            Some(captions) => Ok(captions),
            None => {
                warn!("No captions array in response; using defaults");
                Ok(DEFAULT_CAPTIONS.iter().map(|s| s.to_string()).collect())
            }
        }
    }
}

impl CaptionSuggester for HttpCaptionSuggester {
    async fn suggest(&self, image: &ImageRef) -> Vec<String> {
        match self.request(image).await {
            Ok(captions) => {
                debug!(count = captions.len(), "Captions suggested");
                captions
            }
            Err(e) => {
                warn!(error = %e, "Caption suggestion failed; using fallback");
                self.error_fallback.clone()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SuggestError {
    #[error("no API key configured (set KENAR_API_KEY)")]
    NoApiKey,
    #[error("image is not a base64 data URL")]
    BadImage,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response had no text")]
    EmptyResponse,
    #[error("response was not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
    }
}

/// `data:<mime>;base64,<payload>` -> (mime, payload). The payload must be valid base64.
fn split_data_url(url: &str) -> Result<(&str, &str), SuggestError> {
    let rest = url.strip_prefix("data:").ok_or(SuggestError::BadImage)?;
    let (mime, data) = rest.split_once(";base64,").ok_or(SuggestError::BadImage)?;
    if mime.is_empty() || data.is_empty() {
        return Err(SuggestError::BadImage);
    }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|_| SuggestError::BadImage)?;
    Ok((mime, data))
}

/// Parse the model's answer. A Markdown code fence around the JSON is tolerated.
/// Ok(None) means valid JSON without a captions array.
fn parse_captions(text: &str) -> Result<Option<Vec<String>>, serde_json::Error> {
    let json = strip_code_fence(text.trim());
    let value: serde_json::Value = serde_json::from_str(json)?;
    let Some(items) = value.get("captions").and_then(|c| c.as_array()) else {
        return Ok(None);
    };
    Ok(Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
    ))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence line.
    let inner = match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with('{') => body,
        _ => inner,
    };
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let got = parse_captions(r#"{"captions": ["a", "b", "c"]}"#).unwrap();
        assert_eq!(got, Some(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"captions\": [\"sun\"]}\n```";
        assert_eq!(parse_captions(text).unwrap(), Some(vec!["sun".into()]));
        let bare = "```\n{\"captions\": [\"x\"]}\n```";
        assert_eq!(parse_captions(bare).unwrap(), Some(vec!["x".into()]));
    }

    #[test]
    fn missing_array_is_none_and_garbage_is_error() {
        assert_eq!(parse_captions(r#"{"other": 1}"#).unwrap(), None);
        assert!(parse_captions("not json").is_err());
    }

    #[test]
    fn data_url_split() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,AAAA").unwrap(),
            ("image/jpeg", "AAAA")
        );
        assert!(split_data_url("/tmp/x.jpg").is_err());
        assert!(split_data_url("data:image/jpeg;base64,***").is_err());
    }

    #[test]
    fn first_text_skips_empty_candidates() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":null},{"content":{"parts":[{"text":"hi"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn no_api_key_yields_fallback() {
        let s = HttpCaptionSuggester::new(
            "http://127.0.0.1:9",
            "m",
            None,
            Duration::from_millis(200),
            vec!["fallback".into()],
        );
        let got = s.suggest(&ImageRef::new("data:image/jpeg;base64,AAAA")).await;
        assert_eq!(got, vec!["fallback".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_fallback() {
        let s = HttpCaptionSuggester::new(
            "http://127.0.0.1:9",
            "m",
            Some("k".into()),
            Duration::from_millis(500),
            vec!["fallback".into()],
        );
        let got = s.suggest(&ImageRef::new("data:image/jpeg;base64,AAAA")).await;
        assert_eq!(got, vec!["fallback".to_string()]);
    }
}
