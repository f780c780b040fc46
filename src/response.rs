//! # Response & Cleanup
//!
//! Streams the concatenated file back to the client. The [`Operation`] is
//! moved into the body stream, so its files are deleted as soon as the
//! stream ends: after the last chunk is sent, after a read error, or when
//! the client disconnects and actix drops the body.

use actix_web::http::header::{self, ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web::Bytes, HttpResponse};
use futures_util::stream::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::staging::Operation;

/// Media type of every successful response.
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Read size for the response body.
const CHUNK_SIZE: usize = 64 * 1024;

/// Response body that owns the operation whose output it streams.
///
/// Reaching the end of the file removes the operation's files right away;
/// dropping the body early (client disconnect) removes them through the
/// operation's `Drop`.
struct OutputBody {
    chunks: ReaderStream<File>,
    operation: Operation,
}

impl Stream for OutputBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = Pin::new(&mut this.chunks).poll_next(cx);
        match &next {
            Poll::Ready(None) => this.operation.cleanup(),
            Poll::Ready(Some(Err(err))) => {
                warn!(operation_id = %this.operation.id(), error = %err, "Failed to read output file");
            }
            _ => {}
        }
        next
    }
}

/// Download filename for an operation: `concatenated_audio_<short id>.mp3`.
pub fn download_filename(operation: &Operation) -> String {
    format!("concatenated_audio_{}.mp3", operation.short_id())
}

/// Build a streaming 200 response for the operation's output file.
///
/// Ownership of the operation moves into the body; if opening the file
/// fails the operation is dropped here and cleans up immediately.
pub async fn stream_output(operation: Operation) -> AppResult<HttpResponse> {
    let file = File::open(operation.output_path()).await?;
    let length = file.metadata().await?.len();
    let filename = download_filename(&operation);

    debug!(
        operation_id = %operation.id(),
        bytes = length,
        filename = %filename,
        "Streaming concatenated audio"
    );

    let body = OutputBody {
        chunks: ReaderStream::with_capacity(file, CHUNK_SIZE),
        operation,
    };

    Ok(HttpResponse::Ok()
        .content_type(AUDIO_CONTENT_TYPE)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .insert_header((header::CONTENT_LENGTH, length))
        .streaming(body))
}
