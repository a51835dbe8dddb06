//! The resident build server.

use {
    crate::{
        SERVER_SHUTDOWN,
        state::Fingerprint,
        transport::{SERVER_SOCKET_PATH, ServerTransport},
    },
    os_ext::{
        Fork, close, dup2, exit_code, fcntl_setfd_cloexec, fork, setsid,
        unlink, waitpid,
    },
    scope_exit::ScopeExit,
    std::{io, mem::forget, os::unix::io::{AsFd, AsRawFd}, process},
};

/// Which process a call to [`spawn`] returned in.
pub enum Spawned
{
    /// The original process; a server daemon now runs in the background.
    Client,

    /// A build worker forked by the server, with its standard streams
    /// rewired to the requesting client. The caller should run the
    /// build and exit with its status.
    Worker,
}

/// Fork a build server daemon for the current working directory.
///
/// The daemon serves every request whose fingerprint equals
/// `fingerprint`, forking one build worker at a time; it retires when a
/// request with a different fingerprint arrives, or when a worker exits
/// with [`SERVER_SHUTDOWN`]. This function returns [`Spawned::Client`]
/// in the calling process and [`Spawned::Worker`] in each worker.
pub fn spawn(fingerprint: &Fingerprint) -> io::Result<Spawned>
{
    match fork()? {
        Fork::Parent{..} => Ok(Spawned::Client),
        Fork::Child =>
            match daemonize(fingerprint) {
                Ok(()) => Ok(Spawned::Worker),
                // The daemon has no terminal to complain to.
                Err(_) => process::exit(1),
            },
    }
}

/// Become the build server daemon. Returns only in a forked worker.
fn daemonize(fingerprint: &Fingerprint) -> io::Result<()>
{
    let transport = ServerTransport::bind(SERVER_SOCKET_PATH)?;

    // Disconnect from the terminal and become a persistent daemon.
    setsid()?;
    for fd in 0 .. 3 {
        let _ = close(fd);
    }

    // Leave no stale socket behind if the loop dies on an error.
    // Deliberate retirement unlinks the socket itself.
    let guard = ScopeExit::new(|| {
        let _ = unlink(SERVER_SOCKET_PATH);
    });

    serve(&transport, fingerprint)?;

    // We are now the worker; the socket stays with the server.
    guard.dismiss();
    Ok(())
}

/// The server loop. Returns only in a forked worker.
fn serve(transport: &ServerTransport, fingerprint: &Fingerprint)
    -> io::Result<()>
{
    loop {
        let request = transport.recv_request()?;

        if !fingerprint.matches(&request.state) {
            // The tool was reinvoked with different arguments, or
            // rebuilt. Decline and retire; the client starts a
            // replacement with the new state.
            transport.send_reply(&request.source, SERVER_SHUTDOWN)?;
            retire();
        }

        match fork()? {
            Fork::Child => {
                // The worker takes over the client's standard streams.
                // Since the daemon closed its own stdio at boot, the
                // received descriptors usually already occupy 0, 1, 2
                // and only need their CLOEXEC bit cleared; a dup2 onto
                // the right number clears it as a side effect. Either
                // way the streams must stay open, so none of them is
                // dropped. A failure here must not unwind into the
                // server's cleanup; the exit code carries the bad news
                // instead.
                for (fd, stream) in request.std_fds.into_iter().zip(0 ..) {
                    let installed =
                        if fd.as_raw_fd() == stream {
                            fcntl_setfd_cloexec(fd.as_fd(), false)
                        } else {
                            dup2(fd.as_fd(), stream)
                        };
                    if installed.is_err() {
                        process::exit(1);
                    }
                    forget(fd);
                }
                return Ok(());
            },
            Fork::Parent{child} => {
                // The client learns the worker pid first, so it can
                // forward termination signals while it waits.
                transport.send_reply(&request.source, child)?;

                let wstatus = waitpid(child)?;
                let code = exit_code(wstatus);
                transport.send_reply(&request.source, code)?;

                if code == SERVER_SHUTDOWN {
                    retire();
                }

                // request.std_fds drops here, closing our copies of
                // the client's streams until the next request.
            },
        }
    }
}

/// Exit the server, withdrawing the socket so a waiting client can
/// observe that the old server is gone before starting a new one.
fn retire() -> !
{
    let _ = unlink(SERVER_SOCKET_PATH);
    process::exit(SERVER_SHUTDOWN);
}
