use {crate::retry_on_eintr, std::io};

/// Call waitpid(2), waiting for the given child to terminate.
///
/// Returns the raw wait status;
/// see [`exit_code`] for extracting the exit code.
pub fn waitpid(pid: libc::pid_t) -> io::Result<libc::c_int>
{
    let mut wstatus = 0;

    retry_on_eintr(|| {
        // SAFETY: wstatus points to writable memory.
        let result = unsafe { libc::waitpid(pid, &mut wstatus, 0) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })?;

    Ok(wstatus)
}

/// Extract the exit code from a raw wait status.
///
/// A child killed by a signal is reported as 128 plus the signal number,
/// following the shell convention.
pub fn exit_code(wstatus: libc::c_int) -> libc::c_int
{
    if libc::WIFEXITED(wstatus) {
        libc::WEXITSTATUS(wstatus)
    } else if libc::WIFSIGNALED(wstatus) {
        128 + libc::WTERMSIG(wstatus)
    } else {
        1
    }
}
