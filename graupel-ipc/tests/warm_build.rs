//! Drives the warm-build demo binary end to end: first build forks a
//! server, a repeat build is served warm, changed arguments retire the
//! server and transparently start a replacement, and the reserved exit
//! code retires it for good.

use std::{
    path::Path,
    process::{Child, Command, Stdio},
    thread::sleep,
    time::{Duration, Instant},
};

const TIMEOUT: Duration = Duration::from_secs(30);

struct Outcome
{
    code:   i32,
    stdout: String,
}

fn run_demo(dir: &Path, args: &[&str]) -> Outcome
{
    let child = Command::new(env!("CARGO_BIN_EXE_graupel-warm-demo"))
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn demo client");

    let output = wait_with_timeout(child);
    Outcome{
        code:   output.status.code().expect("demo exits, not killed"),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    }
}

fn wait_with_timeout(mut child: Child) -> std::process::Output
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match child.try_wait().expect("poll demo client") {
            Some(_) =>
                return child.wait_with_output().expect("collect output"),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                panic!("demo client did not finish in time");
            },
            None => sleep(Duration::from_millis(20)),
        }
    }
}

#[test]
fn warm_builds_share_a_server()
{
    let dir = os_ext::mkdtemp("/tmp/graupel-warm-XXXXXX").unwrap();

    // The first build forks a server and runs through it.
    let outcome = run_demo(&dir, &["--code", "0"]);
    assert_eq!(outcome.code, 0);
    assert_eq!(outcome.stdout, "warm build running (exit 0)\n");
    assert!(dir.join(".graupel-ipc-server").exists());

    // A repeat build is served by the resident server. The worker's
    // output still lands on the client's stdout, proving the standard
    // streams crossed the socket.
    let outcome = run_demo(&dir, &["--code", "0"]);
    assert_eq!(outcome.code, 0);
    assert_eq!(outcome.stdout, "warm build running (exit 0)\n");

    // Different arguments retire the server; the client starts a
    // replacement transparently and the build still runs.
    let outcome = run_demo(&dir, &["--code", "7", "changed"]);
    assert_eq!(outcome.code, 7);
    assert_eq!(outcome.stdout, "warm build running (exit 7)\n");
    assert!(dir.join(".graupel-ipc-server").exists());

    // A worker exiting with the reserved code retires the server for
    // good: the client restarts once, the replacement's worker exits
    // the same way, and the code is reported as the final answer.
    let outcome = run_demo(&dir, &["--code", "2", "changed"]);
    assert_eq!(outcome.code, 2);

    // No resident server is left behind.
    let deadline = Instant::now() + TIMEOUT;
    while dir.join(".graupel-ipc-server").exists()
        && Instant::now() < deadline {
        sleep(Duration::from_millis(20));
    }
    assert!(!dir.join(".graupel-ipc-server").exists());
}
