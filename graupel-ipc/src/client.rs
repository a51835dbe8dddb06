//! The build client.

use {
    crate::{
        SERVER_SHUTDOWN,
        server::{self, Spawned},
        state::Fingerprint,
        transport::{
            CLIENT_SOCKET_PATH, ClientTransport, SERVER_SOCKET_PATH,
        },
    },
    graupel_util::logger::{Level, Logger},
    os_ext::{SIGHUP, SIGINT, SIGTERM, sigaction, sigaction_restore},
    std::{
        ffi::CStr,
        io,
        os::unix::io::BorrowedFd,
        process,
        sync::atomic::{AtomicI32, Ordering::SeqCst},
        thread::sleep,
        time::Duration,
    },
};

/// Signals relayed to the worker while the client waits for it.
const FORWARDED_SIGNALS: [libc::c_int; 3] = [SIGINT, SIGTERM, SIGHUP];

/// How long to keep polling for a server socket to appear or vanish.
const PATIENCE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// PID of the current build worker, for the signal handlers.
static WORKER_PID: AtomicI32 = AtomicI32::new(0);

/// Forward a termination signal (e.g. Control-C) to the build worker
/// and bail out.
///
/// Runs in signal context, so only async-signal-safe functions are
/// allowed; see signal-safety(7). kill, unlink, and _exit all qualify.
extern "C" fn forward_signal_and_exit(sig: libc::c_int)
{
    let worker = WORKER_PID.load(SeqCst);
    unsafe {
        libc::kill(worker, sig);
        libc::unlink(CLIENT_SOCKET_PATH.as_ptr());
        libc::_exit(1);
    }
}

/// What one protocol round against the server produced.
enum Round
{
    /// This is the worker process; the caller runs the build.
    Worker,

    /// The build ran; the client exits with this code.
    Done(i32),

    /// The server declined because its state went stale and has
    /// exited; start a replacement and try again.
    Restart,
}

/// Run the build through a resident server in the working directory.
///
/// Returns only in the build worker process, with the standard streams
/// attached to the invoking client's terminal; the caller then runs the
/// build and exits with its status. In the client process this function
/// relays termination signals to the worker and, when the worker is
/// done, exits with the worker's code.
pub fn request_build(fingerprint: &Fingerprint, logger: &dyn Logger)
    -> io::Result<()>
{
    let mut restarted = false;

    loop {
        match round(fingerprint)? {
            Round::Worker => return Ok(()),
            Round::Done(code) => process::exit(code),
            Round::Restart => {
                // Restart at most once, in case the replacement
                // immediately declines as well.
                if restarted {
                    process::exit(SERVER_SHUTDOWN);
                }
                restarted = true;
                logger.on_message(
                    Level::Info,
                    "build server state went stale; starting a new one",
                );
                wait_until_gone(SERVER_SOCKET_PATH);
            },
        }
    }
}

/// Run one round of the protocol: reach a server, request a build,
/// and wait for the result.
fn round(fingerprint: &Fingerprint) -> io::Result<Round>
{
    let state = fingerprint.as_bytes();
    let stdio = client_stdio();

    // Reach a live server, forking one if necessary.
    let mut freshly_spawned = false;
    let mut transport =
        match ClientTransport::connect(CLIENT_SOCKET_PATH, SERVER_SOCKET_PATH)
        {
            Ok(transport) => transport,
            Err(_) =>
                match server::spawn(fingerprint)? {
                    Spawned::Worker => return Ok(Round::Worker),
                    Spawned::Client => {
                        freshly_spawned = true;
                        connect_patiently()?
                    },
                },
        };

    loop {
        match transport.send_request(state, stdio) {
            Ok(()) => break,
            Err(err)
                if err.raw_os_error() == Some(libc::ECONNREFUSED)
                && !freshly_spawned =>
            {
                // The socket file outlived its server (say, a crash or
                // a reboot). Withdraw it and start a fresh server.
                drop(transport);
                let _ = os_ext::unlink(SERVER_SOCKET_PATH);
                match server::spawn(fingerprint)? {
                    Spawned::Worker => return Ok(Round::Worker),
                    Spawned::Client => {
                        freshly_spawned = true;
                        transport = connect_patiently()?;
                    },
                }
            },
            Err(err) => return Err(err),
        }
    }

    // The first reply is the worker pid, unless the server declined.
    // The reserved code cannot collide with a real worker: pid 2 is a
    // kernel thread.
    let first = transport.recv_reply()?;
    if first == SERVER_SHUTDOWN {
        return Ok(Round::Restart);
    }
    let worker = first;

    // Forward termination signals to the worker while we wait.
    WORKER_PID.store(worker, SeqCst);
    let mut saved = Vec::new();
    for &sig in &FORWARDED_SIGNALS {
        match sigaction(sig, forward_signal_and_exit) {
            Ok(old) => saved.push((sig, old)),
            Err(err) => {
                restore_handlers(&saved);
                return Err(err);
            },
        }
    }

    let code = transport.recv_reply();

    restore_handlers(&saved);
    WORKER_PID.store(0, SeqCst);

    let code = code?;
    transport.unlink();
    Ok(Round::Done(code))
}

fn restore_handlers(saved: &[(libc::c_int, libc::sigaction)])
{
    for (sig, old) in saved {
        let _ = sigaction_restore(*sig, old);
    }
}

/// The standard streams to hand to the worker.
fn client_stdio() -> [BorrowedFd<'static>; 3]
{
    // SAFETY: The standard streams stay open for the life of the process.
    unsafe {
        [
            BorrowedFd::borrow_raw(0),
            BorrowedFd::borrow_raw(1),
            BorrowedFd::borrow_raw(2),
        ]
    }
}

/// Connect to a server that was just forked and may not be bound yet.
fn connect_patiently() -> io::Result<ClientTransport>
{
    let deadline = std::time::Instant::now() + PATIENCE;
    loop {
        match ClientTransport::connect(CLIENT_SOCKET_PATH, SERVER_SOCKET_PATH)
        {
            Ok(transport) => return Ok(transport),
            Err(err) if std::time::Instant::now() >= deadline =>
                return Err(err),
            Err(_) => sleep(POLL_INTERVAL),
        }
    }
}

/// Wait for a retiring server to withdraw its socket.
///
/// Bounded; if the socket somehow persists, the next round's bind will
/// replace it anyway.
fn wait_until_gone(path: &CStr)
{
    let deadline = std::time::Instant::now() + PATIENCE;
    while os_ext::stat(path).is_ok()
        && std::time::Instant::now() < deadline {
        sleep(POLL_INTERVAL);
    }
}
