//! # Audio Concatenation Endpoint
//!
//! `POST /fullAudio` accepts two or more audio files as multipart form data
//! and answers with a single MP3 made of the files joined in upload order.
//!
//! ## Request flow:
//! 1. Intake: read and validate the uploads (nothing touches disk yet)
//! 2. Staging: write the inputs and the concat manifest under a fresh operation id
//! 3. Invocation: ffmpeg stream copy, falling back to re-encode
//! 4. Response: stream the output; the operation's files are removed once
//!    the body is done, or right away on any error

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use tracing::{debug, error, info};

use crate::concat::ConcatStrategy;
use crate::error::AppResult;
use crate::intake::{self, UploadedFile};
use crate::response;
use crate::staging::Operation;
use crate::state::AppState;

pub async fn concatenate_audio(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let parts = intake::read_parts(payload, state.config.intake_limits()).await?;
    let files = intake::collect_uploads(parts, &state.config.upload.field_name);
    intake::validate_uploads(&files)?;

    let mut operation = state.staging.begin();
    info!(
        operation_id = %operation.id(),
        files = files.len(),
        bytes = files.iter().map(|f| f.data.len()).sum::<usize>(),
        "Starting concatenation"
    );

    // Dropped unfinished if the client disconnects while ffmpeg runs.
    let tracker = state.begin_operation();
    match run_operation(&state, &mut operation, &files).await {
        Ok(strategy) => {
            tracker.finish(Some(strategy));
            info!(operation_id = %operation.id(), strategy = %strategy, "Concatenation succeeded");
            response::stream_output(operation).await
        }
        Err(err) => {
            tracker.finish(None);
            error!(operation_id = %operation.id(), error = %err, "Concatenation failed");
            // `operation` is dropped before the error response is built.
            Err(err)
        }
    }
}

async fn run_operation(
    state: &AppState,
    operation: &mut Operation,
    files: &[UploadedFile],
) -> AppResult<ConcatStrategy> {
    operation.stage_inputs(files).await?;
    operation.write_manifest().await?;
    debug!(
        operation_id = %operation.id(),
        staged = operation.inputs().len(),
        manifest = %operation.manifest_path().display(),
        "Manifest written"
    );

    let strategy = state
        .concatenator
        .concatenate(operation.manifest_path(), operation.output_path())
        .await?;
    Ok(strategy)
}
