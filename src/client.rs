//! Reconnecting EventSource client.

use std::sync::Arc;

use bytes::Bytes;
use bytes_utils::Str;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{
    RequestBuilder, Response, StatusCode, Url,
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderName, HeaderValue},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    constants::{CONTENT_TYPE_EVENT_STREAM, EMPTY_STR, STATUS_BUFFER},
    decoder::Decoder,
    errors::ClientError,
    event::MessageEvent,
    status::{ReadyState, Status},
};

/// Transformation applied to the outgoing HTTP request before it is sent.
/// Modifiers run in registration order on every connection attempt.
pub type RequestModifier = Box<dyn Fn(RequestBuilder) -> RequestBuilder + Send + Sync>;

/// Attaches basic-auth credentials to every connection attempt.
pub fn with_basic_auth(
    username: impl Into<String>,
    password: impl Into<String>,
) -> RequestModifier {
    let (username, password): (String, String) = (username.into(), password.into());
    Box::new(move |request| request.basic_auth(&username, Some(&password)))
}

/// Attaches a bearer token to every connection attempt.
pub fn with_bearer_token_auth(token: impl Into<String>) -> RequestModifier {
    let token: String = token.into();
    Box::new(move |request| request.bearer_auth(&token))
}

type EventDecoder = Decoder<BoxStream<'static, reqwest::Result<Bytes>>>;

/// Live subscription to a server-sent event stream.
///
/// Events arrive on the [`events`][EventSource::events] channel and
/// lifecycle transitions on [`ready_state`][EventSource::ready_state]. The
/// subscription survives transport failures by reconnecting with the
/// `Last-Event-ID` resume header after the server-advised retry delay.
/// Dropping the handle closes the subscription.
pub struct EventSource {
    url: Url,
    cancel: CancellationToken,
    events: Option<mpsc::Receiver<MessageEvent>>,
    statuses: Option<mpsc::Receiver<Status>>,
}

impl EventSource {
    /// Connects to `url` and spawns the consumer task.
    ///
    /// The handle is returned even when the initial connection fails so the
    /// status channel can be drained for the terminal transitions; the
    /// accompanying result says whether the stream actually opened. An
    /// initial failure is not retried.
    pub async fn new(
        url: Url,
        modifiers: Vec<RequestModifier>,
    ) -> (Self, Result<(), ClientError>) {
        let (events_tx, events_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = mpsc::channel(STATUS_BUFFER);
        let cancel = CancellationToken::new();

        let handle = EventSource {
            url: url.clone(),
            cancel: cancel.clone(),
            events: Some(events_rx),
            statuses: Some(status_rx),
        };

        let mut worker = Worker {
            client: reqwest::Client::new(),
            url,
            modifiers,
            last_event_id: EMPTY_STR,
            last_status: None,
            events_tx,
            status_tx,
            cancel,
        };

        worker.publish(ReadyState::Connecting, None);
        match worker.connect_once().await {
            Ok(response) => {
                worker.publish(ReadyState::Open, None);
                tokio::spawn(worker.run(response));
                (handle, Ok(()))
            }
            Err(err) => {
                worker.shutdown(Some(err.clone()));
                (handle, Err(err))
            }
        }
    }

    /// The configured URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Takes the receive side of the event channel. `None` after the first
    /// call.
    pub fn events(&mut self) -> Option<mpsc::Receiver<MessageEvent>> {
        self.events.take()
    }

    /// Takes the receive side of the ready-state channel. `None` after the
    /// first call.
    pub fn ready_state(&mut self) -> Option<mpsc::Receiver<Status>> {
        self.statuses.take()
    }

    /// Closes the subscription: aborts any in-flight request or retry
    /// sleep, refuses further reconnects, closes the event channel and
    /// publishes the terminal `Closed` state. Idempotent, callable from
    /// any task, and returns without waiting for teardown.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    client: reqwest::Client,
    url: Url,
    modifiers: Vec<RequestModifier>,
    last_event_id: Str,
    last_status: Option<StatusCode>,
    events_tx: mpsc::Sender<MessageEvent>,
    status_tx: mpsc::Sender<Status>,
    cancel: CancellationToken,
}

impl Worker {
    fn publish(&self, state: ReadyState, error: Option<ClientError>) {
        if self.status_tx.try_send(Status::new(state, error)).is_err() {
            debug!(state = %state, "status receiver lagging, transition dropped");
        }
    }

    async fn connect_once(&mut self) -> Result<Response, ClientError> {
        let mut request = self.client.get(self.url.clone());
        for modifier in &self.modifiers {
            request = modifier(request);
        }
        request = request
            .header(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_EVENT_STREAM))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if !self.last_event_id.is_empty() {
            let id = HeaderValue::from_str(&self.last_event_id)
                .map_err(|_| ClientError::InvalidLastEventId(self.last_event_id.to_string()))?;
            request = request.header(HeaderName::from_static("last-event-id"), id);
        }

        debug!(url = %self.url, "connecting");
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(Arc::new(e)))?;
        self.last_status = Some(response.status());

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !media_type_is_event_stream(content_type) {
            return Err(ClientError::ContentType(content_type.to_owned()));
        }
        if !response.status().is_success() {
            return Err(ClientError::HttpNotOk(response.status()));
        }
        Ok(response)
    }

    async fn run(mut self, mut response: Response) {
        loop {
            let mut decoder: EventDecoder = Decoder::new(response.bytes_stream().boxed());
            decoder.set_last_event_id(self.last_event_id.clone());

            let mut failure: Option<ClientError> = loop {
                let item = tokio::select! {
                    _ = self.cancel.cancelled() => return self.shutdown(None),
                    item = decoder.decode() => item,
                };
                match item {
                    Some(Ok(event)) => {
                        if let Some(id) = &event.id {
                            self.last_event_id = id.clone();
                        }
                        let delivered = tokio::select! {
                            _ = self.cancel.cancelled() => return self.shutdown(None),
                            sent = self.events_tx.send(event) => sent.is_ok(),
                        };
                        if !delivered {
                            // The consumer handle is gone.
                            return self.shutdown(None);
                        }
                    }
                    Some(Err(err)) => break Some(ClientError::Stream(Arc::new(err))),
                    None => break None,
                }
            };

            let retry = decoder.retry();
            if !self.must_reconnect(failure.as_ref()) {
                return self.shutdown(failure);
            }

            response = loop {
                debug!(delay = ?retry, "waiting before reconnect");
                tokio::select! {
                    _ = self.cancel.cancelled() => return self.shutdown(None),
                    _ = tokio::time::sleep(retry) => {}
                }
                self.publish(ReadyState::Connecting, failure.take());
                let cancel = self.cancel.clone();
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => return self.shutdown(None),
                    attempt = self.connect_once() => attempt,
                };
                match attempt {
                    Ok(response) => break response,
                    Err(err) => {
                        if !self.must_reconnect(Some(&err)) {
                            return self.shutdown(Some(err));
                        }
                        warn!(error = %err, "reconnect attempt failed");
                        failure = Some(err);
                    }
                }
            };
            self.publish(ReadyState::Open, None);
        }
    }

    /// Clients reconnect after a dropped connection unless told otherwise:
    /// closing the source, an unusable response (content type, 401) or a
    /// 204 all stop the cycle.
    fn must_reconnect(&self, error: Option<&ClientError>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        match error {
            Some(ClientError::ContentType(_))
            | Some(ClientError::Unauthorized)
            | Some(ClientError::InvalidLastEventId(_)) => return false,
            _ => {}
        }
        self.last_status != Some(StatusCode::NO_CONTENT)
    }

    fn shutdown(self, error: Option<ClientError>) {
        debug!(error = ?error, "closing event source");
        self.publish(ReadyState::Closing, None);
        let Self {
            events_tx,
            status_tx,
            ..
        } = self;
        // The event channel closes before the terminal state is visible.
        drop(events_tx);
        let _ = status_tx.try_send(Status::new(ReadyState::Closed, error));
    }
}

fn media_type_is_event_stream(content_type: &str) -> bool {
    // Parameters such as `charset=utf-8` are allowed and ignored.
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    media_type.eq_ignore_ascii_case(CONTENT_TYPE_EVENT_STREAM)
}
