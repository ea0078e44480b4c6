//! First-signal-wins wait over a container's two completion signals.

use std::future::Future;

/// Terminal state of a running container.
#[derive(Debug)]
pub enum Completion<E> {
    /// The process exited with this status.
    Exited(i64),
    /// The engine failed while the process was running.
    Errored(E),
}

/// Wait for whichever of `errored` or `exited` resolves first.
///
/// When both are ready at the same poll the error wins: an exit code
/// reported alongside an engine failure is not trusted.
pub async fn first_signal<E, FE, FX>(errored: FE, exited: FX) -> Completion<E>
where
    FE: Future<Output = E>,
    FX: Future<Output = i64>,
{
    tokio::select! {
        biased;
        err = errored => Completion::Errored(err),
        code = exited => Completion::Exited(code),
    }
}
