use {
    crate::retry_on_eintr,
    std::{
        ffi::{CStr, OsString},
        io,
        os::unix::{
            ffi::OsStringExt,
            io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
        },
    },
};

/// Call readlink(2) with the given arguments.
///
/// readlink(2) truncates the target if it does not fit into the buffer.
/// When this happens, the wrapper function automatically retries the call
/// with a bigger buffer, until it fits.
pub fn readlink(pathname: &CStr) -> io::Result<OsString>
{
    let mut buf: Vec<u8> = Vec::with_capacity(256);

    retry_on_eintr(|| {
        loop {
            // SAFETY: pathname is NUL-terminated, buffer size is correct.
            let len = unsafe {
                libc::readlink(
                    pathname.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.capacity(),
                )
            };

            if len == -1 {
                return Err(io::Error::last_os_error());
            }

            // SAFETY: readlink(2) wrote this many bytes.
            unsafe { buf.set_len(len as usize); }

            if buf.len() == buf.capacity() {
                // There may have been a truncation.
                // Grow the buffer and try again.
                buf.reserve(1);
                continue;
            }

            break Ok(());
        }
    })?;

    Ok(OsString::from_vec(buf))
}

/// Call unlink(2) with the given arguments.
pub fn unlink(pathname: &CStr) -> io::Result<()>
{
    // SAFETY: pathname is NUL-terminated.
    let result = unsafe { libc::unlink(pathname.as_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call dup2(2) with the given arguments.
///
/// The duplicate does not have `FD_CLOEXEC` set;
/// this is what makes dup2(2) useful for installing standard streams.
pub fn dup2(oldfd: BorrowedFd, newfd: RawFd) -> io::Result<()>
{
    retry_on_eintr(|| {
        let result = unsafe { libc::dup2(oldfd.as_raw_fd(), newfd) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}

/// Close a raw file descriptor that is not owned by any RAII handle.
///
/// Useful for the standard streams, which have well-known numbers
/// but no [`OwnedFd`] to speak of.
pub fn close(fd: RawFd) -> io::Result<()>
{
    // NOTE: Not retried on EINTR; the descriptor
    //       is in an unspecified state afterwards.
    let result = unsafe { libc::close(fd) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call pipe2(2) with the given arguments.
///
/// Returns the read end and the write end, in that order.
pub fn pipe2(flags: libc::c_int) -> io::Result<(OwnedFd, OwnedFd)>
{
    let mut fds = [-1; 2];
    let flags = flags | libc::O_CLOEXEC;

    // SAFETY: fds is sufficiently large.
    let result = unsafe { libc::pipe2(fds.as_mut_ptr(), flags) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: pipe2 created two new, open file descriptors.
    let r = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let w = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    Ok((r, w))
}

/// The calling process's side of a fork(2).
#[allow(missing_docs)]
pub enum Fork
{
    Parent{child: libc::pid_t},
    Child,
}

/// Call fork(2).
///
/// The caller is responsible for the usual fork(2) discipline:
/// in a process with multiple threads, the child may only call
/// async-signal-safe functions until it calls execve(2) or _exit(2).
pub fn fork() -> io::Result<Fork>
{
    // SAFETY: fork has no preconditions.
    let pid = unsafe { libc::fork() };

    match pid {
        -1 => Err(io::Error::last_os_error()),
        0  => Ok(Fork::Child),
        _  => Ok(Fork::Parent{child: pid}),
    }
}

/// Call setsid(2).
pub fn setsid() -> io::Result<libc::pid_t>
{
    // SAFETY: setsid has no preconditions.
    let result = unsafe { libc::setsid() };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(result)
}

#[cfg(test)]
mod tests
{
    use {super::*, std::{fs::File, io::{Read, Write}}};

    #[test]
    fn pipe2_round_trip()
    {
        let (r, w) = pipe2(0).unwrap();
        File::from(w).write_all(b"hello").unwrap();
        let mut buf = String::new();
        File::from(r).read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn readlink_self_exe()
    {
        let exe = readlink(c"/proc/self/exe").unwrap();
        assert!(!exe.is_empty());
    }
}
