//! Server-sent event decoding for streaming responses.

use std::io::Read;
use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::transport::{ApiResponse, BlockingStreamingResponse, StreamingResponse};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// The `event:` field; `message` when the server sent none.
    pub event_type: String,
    /// The `data:` payload, multi-line data joined with `\n`.
    pub data: String,
}

impl From<Event> for ServerEvent {
    fn from(event: Event) -> Self {
        Self {
            event_type: event.event,
            data: event.data,
        }
    }
}

type EventItems = Pin<Box<dyn Stream<Item = Result<ServerEvent>> + Send>>;

fn stream_error(error: EventStreamError<Error>) -> Error {
    match error {
        // Keep transport failures as they were reported.
        EventStreamError::Transport(error) => error,
        other => Error::Stream(other.to_string()),
    }
}

fn decode<S>(body: S) -> EventItems
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    Box::pin(
        body.eventsource()
            .map(|item| item.map(ServerEvent::from).map_err(stream_error)),
    )
}

/// Async sequence of events read from a streaming response.
pub struct EventStream {
    head: ApiResponse,
    events: EventItems,
}

impl EventStream {
    pub fn new(response: StreamingResponse) -> Self {
        let head = response.head();
        Self {
            head,
            events: decode(response.body),
        }
    }

    /// Status and headers of the response that opened the stream.
    pub fn head(&self) -> &ApiResponse {
        &self.head
    }

    /// Next event; `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        self.events.next().await
    }
}

/// Blocking sequence of events read from a streaming response.
pub struct BlockingEventStream {
    head: ApiResponse,
    events: futures::executor::BlockingStream<EventItems>,
}

impl BlockingEventStream {
    pub fn new(response: BlockingStreamingResponse) -> Self {
        let head = response.head();
        let chunks = futures::stream::iter(ReadChunks {
            reader: response.body,
            done: false,
        });
        Self {
            head,
            events: futures::executor::block_on_stream(decode(chunks)),
        }
    }

    /// Status and headers of the response that opened the stream.
    pub fn head(&self) -> &ApiResponse {
        &self.head
    }

    /// Next event, blocking; `None` once the server closes the stream.
    pub fn next_event(&mut self) -> Option<Result<ServerEvent>> {
        self.events.next()
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// Adapts a blocking reader into a sequence of byte chunks.
struct ReadChunks {
    reader: Box<dyn Read + Send>,
    done: bool,
}

impl Iterator for ReadChunks {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Result<Bytes>> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(Bytes::from(buf)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
            }
        }
    }
}
