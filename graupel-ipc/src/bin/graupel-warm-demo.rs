//! Run a pretend build through a resident build server.
//!
//! The first invocation in a directory forks a server; later
//! invocations with the same arguments are served warm. The pretend
//! build prints one line to the invoker's terminal and exits with the
//! code given by `--code` (default 0), so the whole client/server/
//! worker round trip can be exercised and scripted against.

use {
    graupel_ipc::{Fingerprint, client},
    graupel_util::{logger::BasicLogger, version::VERSION},
    std::{env, process},
};

fn main()
{
    let fingerprint = Fingerprint::capture(env::args_os(), VERSION);

    if let Err(err) = client::request_build(&fingerprint, &BasicLogger) {
        eprintln!("graupel-warm-demo: {err}");
        process::exit(1);
    }

    // Only the build worker gets here, talking to the client's terminal.
    let code = env::args()
        .skip_while(|arg| arg != "--code")
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    println!("warm build running (exit {code})");
    process::exit(code);
}
