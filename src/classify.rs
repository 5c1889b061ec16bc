use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::audio::decode::RawAudio;
use crate::error::{Result, WaveformError};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/classify";
pub const ANALYSIS_ERROR_LABEL: &str = "Error analyzing sound";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    /// Percent, 0-100.
    pub confidence: f32,
}

impl Classification {
    /// Shown in place of a result when the classifier could not be reached.
    pub fn analysis_error() -> Self {
        Self {
            label: ANALYSIS_ERROR_LABEL.to_string(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    class: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for the sound classification server (`POST /classify`).
pub struct ClassifierClient {
    client: Client,
    endpoint: Url,
}

fn unavailable(err: impl std::fmt::Display) -> WaveformError {
    WaveformError::ClassifierUnavailable(err.to_string())
}

impl ClassifierClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| unavailable(format!("bad endpoint '{}': {}", endpoint, e)))?;
        let client = Client::builder().timeout(timeout).build().map_err(unavailable)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Upload the file as multipart field `file` and parse the top label.
    pub fn classify(&self, raw: &RawAudio) -> Result<Classification> {
        let part = Part::bytes(raw.bytes().to_vec())
            .file_name(raw.name().to_string())
            .mime_str(raw.media_type())
            .map_err(unavailable)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("server returned {}", status)));
        }

        let body: ClassifyResponse = response
            .json()
            .map_err(|e| unavailable(format!("malformed response: {}", e)))?;
        if !(0.0..=100.0).contains(&body.confidence) {
            return Err(unavailable(format!("confidence {} out of range", body.confidence)));
        }

        log::info!("Classified {} as {} ({:.2}%)", raw.name(), body.class, body.confidence);
        Ok(Classification {
            label: body.class,
            confidence: body.confidence,
        })
    }

    /// Like [`classify`](Self::classify) but never fails: any error becomes
    /// the zero-confidence error label.
    pub fn classify_or_fallback(&self, raw: &RawAudio) -> Classification {
        match self.classify(raw) {
            Ok(classification) => classification,
            Err(err) => {
                log::warn!("Error analyzing sound {}: {}", raw.name(), err);
                Classification::analysis_error()
            }
        }
    }

    /// `GET /healthz` next to the classify endpoint.
    pub fn health_check(&self) -> Result<()> {
        let url = self.endpoint.join("healthz").map_err(unavailable)?;
        let response = self.client.get(url).send().map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(unavailable(format!("health check returned {}", response.status())));
        }
        let health: HealthResponse = response
            .json()
            .map_err(|e| unavailable(format!("malformed health response: {}", e)))?;
        if health.status != "ok" {
            return Err(unavailable(format!("server reports status '{}'", health.status)));
        }
        Ok(())
    }
}

/// The classifier as the rest of the app sees it. An endpoint that cannot be
/// turned into a client still answers every upload, with the error label.
pub enum Classifier {
    Remote(ClassifierClient),
    Unavailable(String),
}

impl Classifier {
    pub fn connect(endpoint: &str, timeout: Duration) -> Self {
        match ClassifierClient::new(endpoint, timeout) {
            Ok(client) => Classifier::Remote(client),
            Err(err) => {
                log::error!("{}", err);
                Classifier::Unavailable(err.to_string())
            }
        }
    }

    pub fn classify_or_fallback(&self, raw: &RawAudio) -> Classification {
        match self {
            Classifier::Remote(client) => client.classify_or_fallback(raw),
            Classifier::Unavailable(reason) => {
                log::warn!("Error analyzing sound {}: {}", raw.name(), reason);
                Classification::analysis_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Accept one request, answer with `response`, hand back the raw request.
    fn serve_once(path: &str, response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}{}", listener.local_addr().unwrap(), path);
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let lower = line.to_ascii_lowercase();
                if let Some(len) = lower.strip_prefix("content-length:") {
                    content_length = len.trim().parse().unwrap();
                }
                if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                    chunked = true;
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = Vec::new();
            if chunked {
                while !body.ends_with(b"0\r\n\r\n") {
                    let mut byte = [0u8; 1];
                    if reader.read(&mut byte).unwrap() == 0 {
                        break;
                    }
                    body.push(byte[0]);
                }
            } else {
                body.resize(content_length, 0);
                reader.read_exact(&mut body).unwrap();
            }
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            head + &String::from_utf8_lossy(&body)
        });
        (url, handle)
    }

    fn upload() -> RawAudio {
        RawAudio::new("horn.wav", "audio/wav", b"RIFF....WAVE".to_vec())
    }

    fn client(url: &str) -> ClassifierClient {
        ClassifierClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn parses_successful_classification() {
        let (url, server) = serve_once(
            "/classify",
            http_response("200 OK", r#"{"class": "Siren", "confidence": 87.52}"#),
        );
        let result = client(&url).classify(&upload()).unwrap();
        assert_eq!(result.label, "Siren");
        assert!((result.confidence - 87.52).abs() < 1e-4);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /classify"));
        assert!(request.contains("name=\"file\""));
        assert!(request.contains("filename=\"horn.wav\""));
        assert!(request.contains("RIFF....WAVE"));
    }

    #[test]
    fn server_error_falls_back_to_error_label() {
        let (url, server) = serve_once("/classify", http_response("500 Internal Server Error", ""));
        let result = client(&url).classify_or_fallback(&upload());
        assert_eq!(result, Classification::analysis_error());
        assert_eq!(result.label, "Error analyzing sound");
        assert_eq!(result.confidence, 0.0);
        server.join().unwrap();
    }

    #[test]
    fn malformed_body_is_unavailable() {
        let (url, server) = serve_once("/classify", http_response("200 OK", r#"{"label": 3}"#));
        let err = client(&url).classify(&upload()).unwrap_err();
        assert!(matches!(err, WaveformError::ClassifierUnavailable(_)));
        server.join().unwrap();
    }

    #[test]
    fn out_of_range_confidence_is_unavailable() {
        let (url, server) = serve_once(
            "/classify",
            http_response("200 OK", r#"{"class": "Dog bark", "confidence": 250.0}"#),
        );
        assert!(client(&url).classify(&upload()).is_err());
        server.join().unwrap();
    }

    #[test]
    fn unreachable_server_is_unavailable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client(&format!("http://127.0.0.1:{}/classify", port));
        assert!(matches!(
            client.classify(&upload()),
            Err(WaveformError::ClassifierUnavailable(_))
        ));
        assert_eq!(client.classify_or_fallback(&upload()), Classification::analysis_error());
    }

    #[test]
    fn health_check_hits_sibling_path() {
        let (url, server) = serve_once("/classify", http_response("200 OK", r#"{"status": "ok"}"#));
        client(&url).health_check().unwrap();
        assert!(server.join().unwrap().starts_with("GET /healthz"));
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        assert!(ClassifierClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn bad_endpoint_still_answers_with_error_label() {
        let classifier = Classifier::connect("127.0.0.1:8000/classify", Duration::from_secs(1));
        assert!(matches!(classifier, Classifier::Unavailable(_)));
        assert_eq!(classifier.classify_or_fallback(&upload()), Classification::analysis_error());
    }
}
