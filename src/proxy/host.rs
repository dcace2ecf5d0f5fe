use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::message::{
    CancelMessage, HeadersMessage, ReaderMessage, StreamEnvelope,
    StreamRequest,
};
use crate::transport::{
    FullReader, PdfStream, RangeReader, ReadResult, ReaderHeaders,
};
use crate::{ByteRange, Result};

/// Privileged side of the proxy: owns the real stream and serves the
/// readers a [`ProxyStream`](super::ProxyStream) asks for.
pub struct StreamHost<S> {
    source: S,
    inbox: mpsc::UnboundedReceiver<StreamEnvelope>,
}

impl<S: PdfStream + 'static> StreamHost<S> {
    pub(crate) fn new(
        source: S,
        inbox: mpsc::UnboundedReceiver<StreamEnvelope>,
    ) -> Self {
        Self { source, inbox }
    }

    /// Serves requests until the worker side is dropped, then cancels
    /// whatever is still outstanding on the source.
    ///
    /// Readers are pumped by tasks spawned on the current runtime.
    pub async fn run(mut self) -> S {
        while let Some(envelope) = self.inbox.recv().await {
            self.serve(envelope);
        }
        log::debug!("proxy/host: worker disconnected");
        self.source
            .cancel_all_requests("Worker was terminated");
        self.source
    }

    fn serve(&mut self, envelope: StreamEnvelope) {
        let StreamEnvelope {
            stream_id,
            request,
            headers,
            events,
            cancel,
        } = envelope;
        log::debug!("proxy/{}: serving {:?}", stream_id, request);

        match request {
            StreamRequest::GetReader => {
                // The worker only asks again once it released its previous
                // full reader, so release ours too.
                self.source
                    .cancel_full_reader("Full reader was requested again");
                let reader = self.source.get_full_reader();
                tokio::spawn(pump_full(
                    stream_id, reader, headers, events, cancel,
                ));
            }
            StreamRequest::GetRangeReader { begin, end } => {
                let reader = ByteRange::new(begin, end)
                    .and_then(|range| self.source.get_range_reader(range));
                match reader {
                    Ok(reader) => {
                        tokio::spawn(pump(
                            stream_id,
                            ServedReader::Range(reader),
                            events,
                            cancel,
                        ));
                    }
                    Err(err) => {
                        log::warn!("proxy/{}: {}", stream_id, err);
                        let _ = events.try_send(ReaderMessage::Error(
                            err.to_string(),
                        ));
                    }
                }
            }
        }
    }
}

enum ServedReader {
    Full(Arc<dyn FullReader>),
    Range(Arc<dyn RangeReader>),
}

impl ServedReader {
    async fn read(&self) -> Result<ReadResult> {
        match self {
            Self::Full(reader) => reader.read().await,
            Self::Range(reader) => reader.read().await,
        }
    }

    fn cancel(&self, reason: &str) {
        match self {
            Self::Full(reader) => reader.cancel(reason),
            Self::Range(reader) => reader.cancel(reason),
        }
    }
}

fn cancel_reason(
    message: std::result::Result<CancelMessage, oneshot::error::RecvError>,
) -> String {
    match message {
        Ok(message) => message.reason,
        Err(_) => "Reader was dropped".to_string(),
    }
}

async fn pump_full(
    stream_id: Uuid,
    reader: Arc<dyn FullReader>,
    headers: Option<oneshot::Sender<HeadersMessage>>,
    events: mpsc::Sender<ReaderMessage>,
    mut cancel: oneshot::Receiver<CancelMessage>,
) {
    let ready = tokio::select! {
        message = &mut cancel => {
            reader.cancel(&cancel_reason(message));
            return;
        }
        ready = reader.headers_ready() => ready,
    };

    let message = match &ready {
        Ok(()) => HeadersMessage::Ready(ReaderHeaders {
            content_length: reader.content_length(),
            is_streaming_supported: reader.is_streaming_supported(),
            is_range_supported: reader.is_range_supported(),
        }),
        Err(err) => HeadersMessage::Failed(err.to_string()),
    };
    if let Some(headers) = headers {
        let _ = headers.send(message);
    }
    if let Err(err) = ready {
        log::warn!("proxy/{}: headers failed: {}", stream_id, err);
        let _ = events
            .send(ReaderMessage::Error(err.to_string()))
            .await;
        return;
    }

    pump(stream_id, ServedReader::Full(reader), events, cancel).await;
}

async fn pump(
    stream_id: Uuid,
    reader: ServedReader,
    events: mpsc::Sender<ReaderMessage>,
    mut cancel: oneshot::Receiver<CancelMessage>,
) {
    loop {
        let message = tokio::select! {
            message = &mut cancel => {
                reader.cancel(&cancel_reason(message));
                return;
            }
            result = reader.read() => match result {
                Ok(ReadResult::Data(chunk)) => ReaderMessage::Chunk(chunk),
                Ok(ReadResult::Done) => ReaderMessage::Done,
                Err(err) => ReaderMessage::Error(err.to_string()),
            },
        };
        let last = !matches!(message, ReaderMessage::Chunk(_));

        tokio::select! {
            message = &mut cancel => {
                reader.cancel(&cancel_reason(message));
                return;
            }
            sent = events.send(message) => {
                if sent.is_err() {
                    reader.cancel("Reader was dropped");
                    return;
                }
            }
        }

        if last {
            log::trace!("proxy/{}: finished", stream_id);
            return;
        }
    }
}
