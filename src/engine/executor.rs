//! Executor Workers
//!
//! A fixed-size pool of tasks, each running the same loop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  loop                                                        │
//! │    ticket = queue.dequeue()          (waits while empty)     │
//! │    turn   = sequencer.enter(ticket)  (waits for its turn)    │
//! │    answer = parse failed ? parse-error answer                │
//! │                          : dispatcher.dispatch(command)      │
//! │    deliver(answer)                   (non-blocking push)     │
//! │    drop(turn)                                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure of one command ends as an answer or a log line; nothing
//! escapes the loop to affect another client's command.

use crate::connection::DeliveryError;
use crate::engine::Engine;
use crate::protocol::{Answer, Command, ParseStatus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Spawns `count` executor tasks over the engine's queue.
pub fn spawn_executors(count: usize, engine: Arc<Engine>) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| tokio::spawn(executor_loop(id, Arc::clone(&engine))))
        .collect()
}

async fn executor_loop(id: usize, engine: Arc<Engine>) {
    while let Ok(ticket) = engine.queue.dequeue().await {
        let _turn = engine.sequencer.enter(ticket.seq).await;
        trace!(executor = id, seq = ticket.seq, "Executing");

        if let Some(answer) = execute(&engine, ticket.command) {
            if let Err(e) = deliver(&engine, answer) {
                debug!(executor = id, error = %e, "Answer dropped");
            }
        }
    }

    debug!(executor = id, "Command queue closed, executor exiting");
}

/// Runs one dequeued command to its answer.
///
/// An answer for the command's own origin goes back over the connection the
/// command arrived on, never to whichever session holds that key now.
pub fn execute(engine: &Engine, command: Command) -> Option<Answer> {
    engine.stats.command_processed();

    let origin = command.origin;
    let reply_to = command.connection.clone();

    let answer = match &command.status {
        ParseStatus::Failed(err) => {
            engine.stats.parse_error();
            warn!(origin = ?command.origin, error = %err, "Unable to parse message: {}", command.raw);
            command.origin.map(|key| Answer::parse_error(key, err))
        }
        ParseStatus::Parsed => engine.dispatcher.dispatch(command),
    }?;

    Some(match reply_to {
        Some(connection) if answer.route.is_none() && Some(answer.destination) == origin => {
            answer.with_route(connection)
        }
        _ => answer,
    })
}

/// Pushes an answer to its destination's connection.
pub fn deliver(engine: &Engine, answer: Answer) -> Result<(), DeliveryError> {
    let connection = match answer.route {
        Some(ref route) => route.clone(),
        None => match engine.dispatcher.registry().lookup(answer.destination) {
            Ok(session) => session.connection().clone(),
            Err(_) => {
                return Err(DeliveryError {
                    peer: answer.destination.to_string(),
                })
            }
        },
    };

    connection.send_frame(answer.encode())?;
    engine.stats.answer_sent();
    Ok(())
}
