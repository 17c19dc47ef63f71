//! HTTP Server-Sent-Events transport.
//!
//! Opens `GET` event streams with reqwest and keeps them alive on its own:
//! - `Accept: text/event-stream` with caller headers and `Last-Event-ID` resumption
//! - Auto-reconnect with fixed or exponential backoff, overridden by server `retry:`
//! - Failed attempts reported as `RETRY_ERROR` frames with the response or error chain
//! - TLS 1.3 minimum with optional custom CA certificates

use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client as HttpClient, Response, header};
use tracing::{debug, error, info, warn};
use url::Url;

use sselink_transport_traits::{
    AtomicMetrics, FrameEmitter, RawStatus, ResponsePayload, StreamHandle, StreamMetrics,
    StreamRequest, StreamTransport, ThrowablePayload, TlsVersion, TransportError,
    TransportResult,
};

use crate::config::HttpStreamConfig;
use crate::parser::{SseItem, SseParser};

const INSECURE_TLS_ENV_VAR: &str = "SSELINK_ALLOW_INSECURE_TLS";
const LAST_EVENT_ID: header::HeaderName = header::HeaderName::from_static("last-event-id");

/// HTTP event stream transport
pub struct HttpStreamTransport {
    config: Arc<HttpStreamConfig>,
    http_client: HttpClient,
    metrics: Arc<AtomicMetrics>,
}

impl std::fmt::Debug for HttpStreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamTransport")
            .field("retry_policy", &self.config.retry_policy)
            .field("timeouts", &self.config.timeouts)
            .finish()
    }
}

impl HttpStreamTransport {
    /// Create a new HTTP event stream transport
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConfigurationError`] if the HTTP client cannot be built.
    pub fn new(config: HttpStreamConfig) -> TransportResult<Self> {
        // Must explicitly call use_rustls_tls() because cargo features are additive
        // and other dependencies may bring in native-tls.
        // No overall request timeout: it would cut long-lived streams.
        let mut client_builder = HttpClient::builder()
            .use_rustls_tls()
            .connect_timeout(config.timeouts.connect);

        if let Some(ref user_agent) = config.user_agent {
            client_builder = client_builder.user_agent(user_agent);
        }

        client_builder = match config.tls.min_version {
            TlsVersion::Tls13 => client_builder.min_tls_version(reqwest::tls::Version::TLS_1_3),
        };

        if !config.tls.validate_certificates {
            // Insecure TLS requires an explicit env var opt-in
            if std::env::var(INSECURE_TLS_ENV_VAR).is_err() {
                error!(
                    "SECURITY: Certificate validation disabled but {} not set. \
                     Overriding to validate_certificates=true. \
                     Set {}=1 to allow insecure TLS.",
                    INSECURE_TLS_ENV_VAR, INSECURE_TLS_ENV_VAR
                );
            } else {
                warn!(
                    "SECURITY WARNING: TLS certificate validation is DISABLED. \
                     Only use this against development servers."
                );
                client_builder = client_builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(ca_certs) = &config.tls.custom_ca_certs {
            let mut loaded = 0usize;
            let total = ca_certs.len();
            for cert_bytes in ca_certs {
                // Try to parse as PEM or DER
                if let Ok(cert) = reqwest::Certificate::from_pem(cert_bytes) {
                    client_builder = client_builder.add_root_certificate(cert);
                    loaded += 1;
                } else if let Ok(cert) = reqwest::Certificate::from_der(cert_bytes) {
                    client_builder = client_builder.add_root_certificate(cert);
                    loaded += 1;
                } else {
                    warn!(
                        "Failed to parse custom CA certificate ({}/{}), skipping",
                        loaded + 1,
                        total
                    );
                }
            }
            if loaded == 0 && total > 0 {
                error!("All {} custom CA certificates failed to parse", total);
            }
            if loaded > 0 {
                info!("Loaded {}/{} custom CA certificates", loaded, total);
            }
        }

        let http_client = client_builder.build().map_err(|e| {
            TransportError::ConfigurationError(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            metrics: Arc::new(AtomicMetrics::new()),
        })
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &HttpStreamConfig {
        &self.config
    }

    /// Counters aggregated over every stream opened by this transport.
    pub fn metrics(&self) -> StreamMetrics {
        self.metrics.snapshot()
    }
}

impl StreamTransport for HttpStreamTransport {
    fn establish(&self, request: StreamRequest) -> TransportResult<StreamHandle> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::ConfigurationError(format!("invalid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::ConfigurationError(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        let headers = build_headers(&request.headers)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            TransportError::ConfigurationError("no tokio runtime available".to_string())
        })?;

        let (emitter, handle) = StreamHandle::channel(self.config.frame_buffer);
        let task = ConnectionTask {
            url,
            headers,
            http_client: self.http_client.clone(),
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
            emitter,
        };

        info!(url = %task.url, "Starting event stream");
        runtime.spawn(task.run());

        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn build_headers(extra: &BTreeMap<String, String>) -> TransportResult<header::HeaderMap> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );

    for (name, value) in extra {
        let name = header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            TransportError::ConfigurationError(format!("invalid header name: {name}"))
        })?;
        let value = header::HeaderValue::from_str(value).map_err(|_| {
            TransportError::ConfigurationError(format!("invalid value for header {name}"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// How one connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The attempt failed and was reported; a re-dial may follow.
    ///
    /// A body that ends cleanly counts as a failure too. It is reported as a
    /// cause with the message `event stream ended` and no stack trace, while
    /// read and connect errors carry their source chain as the trace.
    Failed,
    /// The consumer dropped its handle.
    ConsumerGone,
}

struct ConnectionTask {
    url: Url,
    headers: header::HeaderMap,
    http_client: HttpClient,
    config: Arc<HttpStreamConfig>,
    metrics: Arc<AtomicMetrics>,
    emitter: FrameEmitter,
}

/// Per-stream state carried across re-dials.
#[derive(Debug)]
struct StreamState {
    parser: SseParser,
    attempt: u32,
    server_retry: Option<Duration>,
}

impl ConnectionTask {
    async fn run(self) {
        let mut state = StreamState {
            parser: SseParser::new(self.config.limits.max_frame_size),
            attempt: 0,
            server_retry: None,
        };

        loop {
            if state.attempt > 0 {
                let Some(policy_delay) = self.config.retry_policy.delay(state.attempt) else {
                    warn!(
                        url = %self.url,
                        attempts = state.attempt,
                        "Max retry attempts reached, giving up"
                    );
                    self.emitter.emit_closed().await;
                    return;
                };
                if !self.emitter.emit_pre_retry().await {
                    return;
                }
                self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);

                let delay = state.server_retry.unwrap_or(policy_delay);
                debug!(url = %self.url, attempt = state.attempt, ?delay, "Reconnecting");
                tokio::select! {
                    () = self.emitter.terminated() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                () = self.emitter.terminated() => break,
                outcome = self.connect_and_stream(&mut state) => outcome,
            };

            match outcome {
                Outcome::Failed => {
                    state.attempt = state.attempt.saturating_add(1);
                    state.parser.reset();
                }
                Outcome::ConsumerGone => {
                    debug!(url = %self.url, "Stream consumer gone, stopping");
                    return;
                }
            }
        }

        debug!(url = %self.url, "Event stream terminated");
        self.emitter.emit_closed().await;
    }

    async fn connect_and_stream(&self, state: &mut StreamState) -> Outcome {
        let mut headers = self.headers.clone();
        if let Some(last_id) = state.parser.last_event_id()
            && let Ok(value) = header::HeaderValue::from_str(last_id)
        {
            headers.insert(LAST_EVENT_ID, value);
        }

        self.metrics.connections.fetch_add(1, Ordering::Relaxed);
        let request = self.http_client.get(self.url.clone()).headers(headers).send();
        let response = match tokio::time::timeout(self.config.timeouts.connect, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.metrics.failed_connections.fetch_add(1, Ordering::Relaxed);
                warn!(url = %self.url, error = %e, "Failed to connect");
                return self.report(Some(throwable_from(&e)), None).await;
            }
            Err(_) => {
                self.metrics.failed_connections.fetch_add(1, Ordering::Relaxed);
                let message = format!(
                    "no response within {:?}",
                    self.config.timeouts.connect
                );
                warn!(url = %self.url, "Failed to connect: {}", message);
                return self.report(Some(throwable_message(message)), None).await;
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.metrics.failed_connections.fetch_add(1, Ordering::Relaxed);
            warn!(url = %self.url, status = status.as_u16(), "Event stream rejected");
            let payload = self.response_payload(response).await;
            return self.report(None, Some(payload)).await;
        }

        info!(url = %self.url, "Event stream established");
        if !self.emitter.emit_open().await {
            return Outcome::ConsumerGone;
        }
        state.attempt = 0;

        let mut stream = response.bytes_stream();
        loop {
            let next = match self.config.timeouts.read {
                Some(read_timeout) => match tokio::time::timeout(read_timeout, stream.next()).await
                {
                    Ok(next) => next,
                    Err(_) => {
                        let message = format!("no data received within {read_timeout:?}");
                        warn!(url = %self.url, "{}", message);
                        return self.report(Some(throwable_message(message)), None).await;
                    }
                },
                None => stream.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    for item in state.parser.feed(&chunk) {
                        if !self.forward(item, &mut state.server_retry).await {
                            return Outcome::ConsumerGone;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(url = %self.url, error = %e, "Error reading event stream");
                    return self.report(Some(throwable_from(&e)), None).await;
                }
                // Clean end of body, reported like a dropped connection.
                None => {
                    debug!(url = %self.url, "Event stream ended");
                    return self
                        .report(Some(throwable_message("event stream ended")), None)
                        .await;
                }
            }
        }
    }

    async fn forward(&self, item: SseItem, server_retry: &mut Option<Duration>) -> bool {
        match item {
            SseItem::Event { id, event, data } => {
                self.metrics.record_frame(data.len());
                self.emitter.emit_message(id, event, data).await
            }
            SseItem::Oversized { event } => {
                self.metrics.oversized_frames.fetch_add(1, Ordering::Relaxed);
                warn!(
                    url = %self.url,
                    event = %event,
                    max = ?self.config.limits.max_frame_size,
                    "Dropping oversized event"
                );
                true
            }
            SseItem::Comment(text) => self.emitter.emit_comment(text).await,
            SseItem::Retry(millis) => {
                *server_retry = Some(Duration::from_millis(millis));
                self.emitter.emit_retry_time(millis).await
            }
        }
    }

    async fn report(
        &self,
        throwable: Option<ThrowablePayload>,
        response: Option<ResponsePayload>,
    ) -> Outcome {
        if self.emitter.emit_retry_error(throwable, response).await {
            Outcome::Failed
        } else {
            Outcome::ConsumerGone
        }
    }

    async fn response_payload(&self, response: Response) -> ResponsePayload {
        let status = response.status().as_u16().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let limit = self.config.limits.max_error_body_size;
        let body = tokio::time::timeout(self.config.timeouts.connect, read_body(response, limit))
            .await
            .unwrap_or(None);

        ResponsePayload {
            status: Some(RawStatus::Text(status)),
            body,
            headers: Some(headers),
        }
    }
}

async fn read_body(response: Response, limit: usize) -> Option<String> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();
    while body.len() < limit {
        match stream.next().await {
            Some(Ok(chunk)) => body.extend_from_slice(&chunk),
            Some(Err(e)) => {
                debug!(error = %e, "Failed to read error response body");
                break;
            }
            None => break,
        }
    }
    body.truncate(limit);
    (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned())
}

fn throwable_message(message: impl Into<String>) -> ThrowablePayload {
    ThrowablePayload {
        message: Some(message.into()),
        stack_trace: None,
    }
}

fn throwable_from(error: &(dyn StdError + 'static)) -> ThrowablePayload {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    ThrowablePayload {
        message: Some(error.to_string()),
        stack_trace: (!chain.is_empty()).then(|| chain.join("\n")),
    }
}
