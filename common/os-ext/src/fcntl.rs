use std::{
    io,
    os::unix::io::{AsRawFd, BorrowedFd},
};

/// Call fcntl(2) with `F_SETFD`, enabling or disabling `FD_CLOEXEC`.
///
/// The one deliberate hole in this crate's descriptors-are-born-CLOEXEC
/// rule: a descriptor being installed as a standard stream must survive
/// execve(2).
pub fn fcntl_setfd_cloexec(fd: BorrowedFd, enabled: bool) -> io::Result<()>
{
    // SAFETY: F_GETFD takes no argument.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }

    let flags =
        if enabled {
            flags | libc::FD_CLOEXEC
        } else {
            flags & !libc::FD_CLOEXEC
        };

    // SAFETY: F_SETFD takes an int argument.
    let result = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::pipe2, std::os::unix::io::AsFd};

    #[test]
    fn toggling_cloexec()
    {
        let (pipe_r, _pipe_w) = pipe2(0).unwrap();

        // pipe2 creates descriptors with CLOEXEC set.
        let flags = unsafe {
            libc::fcntl(pipe_r.as_raw_fd(), libc::F_GETFD)
        };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);

        fcntl_setfd_cloexec(pipe_r.as_fd(), false).unwrap();
        let flags = unsafe {
            libc::fcntl(pipe_r.as_raw_fd(), libc::F_GETFD)
        };
        assert_eq!(flags & libc::FD_CLOEXEC, 0);

        fcntl_setfd_cloexec(pipe_r.as_fd(), true).unwrap();
        let flags = unsafe {
            libc::fcntl(pipe_r.as_raw_fd(), libc::F_GETFD)
        };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }
}
