//! HTTP + server-sent-events implementation of the subscription
//! contract.
//!
//! One POST per turn; the response byte stream is parsed incrementally
//! into raw chunk values and delivered through the observer callbacks.
//! Deliberately no retry/backoff and no reconnect: the client consumes
//! this as an opaque ordered event source and owns all recovery policy.

mod config;
mod sse;

pub use config::EndpointConfig;
pub use sse::SseFrameParser;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Client;

use session_protocol::{
    SubscriptionHandle, SubscriptionObserver, TransportError, TurnRequest, TurnSubscriber,
};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

type CancelFlag = Arc<AtomicBool>;

/// SSE-backed [`TurnSubscriber`]. Must be used from within a tokio
/// runtime: each subscribe spawns one reader task.
#[derive(Debug)]
pub struct SseSubscriber {
    http: Client,
    config: EndpointConfig,
}

impl SseSubscriber {
    pub fn new(config: EndpointConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self { http, config })
    }

    fn build_headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.config.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|_| TransportError::Connect("invalid access token".to_owned()))?,
        );
        if let Some(user_agent) = &self.config.user_agent {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent)
                    .map_err(|_| TransportError::Connect("invalid user agent".to_owned()))?,
            );
        }
        for (key, value) in &self.config.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| TransportError::Connect(format!("invalid header key: {key}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::Connect(format!("invalid header value for {key}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl TurnSubscriber for SseSubscriber {
    fn subscribe(
        &self,
        request: &TurnRequest,
        observer: Arc<dyn SubscriptionObserver>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
        let headers = self.build_headers()?;
        let endpoint = self.config.stream_endpoint();
        let http = self.http.clone();
        let request = request.clone();
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);

        tokio::spawn(async move {
            run_stream(http, endpoint, headers, request, observer, task_cancel).await;
        });

        Ok(Box::new(SseHandle { cancel }))
    }
}

async fn run_stream(
    http: Client,
    endpoint: String,
    headers: HeaderMap,
    request: TurnRequest,
    observer: Arc<dyn SubscriptionObserver>,
    cancel: CancelFlag,
) {
    let send = http.post(&endpoint).headers(headers).json(&request).send();
    let response = match await_or_cancel(send, &cancel).await {
        None => return,
        Some(Ok(response)) => response,
        Some(Err(error)) => {
            observer.on_error(TransportError::Connect(error.to_string()));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = match await_or_cancel(response.text(), &cancel).await {
            None => return,
            Some(body) => body.unwrap_or_default(),
        };
        observer.on_error(TransportError::Status(status.as_u16(), body));
        return;
    }

    let mut bytes = response.bytes_stream();
    let mut parser = SseFrameParser::default();

    loop {
        let chunk = match await_or_cancel(bytes.next(), &cancel).await {
            None => return,
            Some(None) => break,
            Some(Some(Ok(chunk))) => chunk,
            Some(Some(Err(error))) => {
                observer.on_error(TransportError::Stream(error.to_string()));
                return;
            }
        };

        for value in parser.feed(&chunk) {
            if cancel.load(Ordering::Acquire) {
                return;
            }
            observer.on_chunk(value);
        }
    }

    if !cancel.load(Ordering::Acquire) {
        observer.on_complete();
    }
}

/// Awaits a future while polling the cancel flag. Returns `None` once
/// cancelled; no further observer callbacks may be issued after that.
async fn await_or_cancel<F>(future: F, cancel: &CancelFlag) -> Option<F::Output>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if cancel.load(Ordering::Acquire) {
            return None;
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if cancel.load(Ordering::Acquire) {
                return None;
            }
            return Some(output);
        }
    }
}

struct SseHandle {
    cancel: CancelFlag,
}

impl SubscriptionHandle for SseHandle {
    fn unsubscribe(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}
