//! Client side of the API: reassembling streamed replies, the local message
//! cache of the open conversation and the HTTP client used by the CLI.

mod api;
mod reassembler;
mod session;

pub use api::{AirwatchClient, ChunkStream, ClientError, DEFAULT_SERVER_URL};
pub use reassembler::{StreamOutcome, StreamReassembler};
pub use session::{ChatSession, LocalMessage, SendState, SendTicket, SessionError};

use futures::StreamExt;

/// Streams one reply into `session`, calling `on_fragment` as text arrives.
///
/// A body that fails mid-way or ends without the completion marker is an
/// error; the session is left in its failed state either way.
pub async fn stream_reply<F>(
    session: &mut ChatSession,
    ticket: &SendTicket,
    mut body: ChunkStream,
    mut on_fragment: F,
) -> Result<String, ClientError>
where
    F: FnMut(&str),
{
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for fragment in session.apply_chunk(ticket, &bytes)? {
                    on_fragment(&fragment);
                }
            }
            Err(err) => {
                session.fail(ticket, err.to_string())?;
                return Err(err);
            }
        }
    }

    match session.finish(ticket)? {
        StreamOutcome::Completed => Ok(session
            .messages()
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default()),
        StreamOutcome::Truncated => match session.state() {
            SendState::Failed(reason) => Err(ClientError::StreamFailed(reason.clone())),
            _ => Err(ClientError::StreamFailed("The reply was cut short".to_string())),
        },
    }
}
