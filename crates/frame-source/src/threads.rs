use std::{io, thread, time::Duration};

use crossbeam_channel::bounded;

/// Spawn a named thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

/// Run `f` on a transient thread and wait at most `deadline` for it.
///
/// Returns `None` when the thread could not be spawned or did not finish in
/// time; a late thread is left detached.
pub(crate) fn run_with_deadline<F, T>(name: &str, deadline: Duration, f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = bounded(1);
    let spawned = spawn_thread(name, move || {
        let _ = tx.send(f());
    });
    if let Err(err) = spawned {
        tracing::warn!("failed to spawn {name} thread: {err}");
        return None;
    }
    rx.recv_timeout(deadline).ok()
}
