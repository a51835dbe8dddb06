//! Unix domain sockets and descriptor passing.

use {
    crate::retry_on_eintr,
    std::{
        ffi::CStr,
        io,
        mem::{size_of, zeroed},
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    },
};

/// Address of a Unix domain socket.
#[derive(Clone, Copy)]
pub struct UnixAddr
{
    addr: libc::sockaddr_un,
    len:  libc::socklen_t,
}

impl UnixAddr
{
    /// Create an address for the given path name.
    ///
    /// Fails with `EINVAL` if the path does not fit in `sun_path`.
    pub fn new(pathname: &CStr) -> io::Result<Self>
    {
        // SAFETY: All-zeroes is a valid sockaddr_un.
        let mut addr = unsafe { zeroed::<libc::sockaddr_un>() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let bytes = pathname.to_bytes_with_nul();
        if bytes.len() > addr.sun_path.len() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }

        Ok(Self{addr, len: size_of::<libc::sockaddr_un>() as libc::socklen_t})
    }

    fn as_ptr(&self) -> *const libc::sockaddr
    {
        &self.addr as *const libc::sockaddr_un as *const libc::sockaddr
    }
}

/// Call socket(2), creating a datagram socket in the Unix domain.
pub fn socket_unix_dgram() -> io::Result<OwnedFd>
{
    // SAFETY: socket has no preconditions.
    let fd = unsafe {
        libc::socket(libc::AF_UNIX, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0)
    };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: fd is a new, open file descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Call bind(2) with the given arguments.
pub fn bind(fd: BorrowedFd, addr: &UnixAddr) -> io::Result<()>
{
    // SAFETY: addr points to a valid sockaddr_un of the stated length.
    let result = unsafe { libc::bind(fd.as_raw_fd(), addr.as_ptr(), addr.len) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call connect(2) with the given arguments.
pub fn connect(fd: BorrowedFd, addr: &UnixAddr) -> io::Result<()>
{
    retry_on_eintr(|| {
        // SAFETY: addr points to a valid sockaddr_un of the stated length.
        let result = unsafe {
            libc::connect(fd.as_raw_fd(), addr.as_ptr(), addr.len)
        };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}

/// Call sendmsg(2), transferring file descriptors in the ancillary data.
///
/// The descriptors are sent as a single `SCM_RIGHTS` control message.
/// Returns the number of payload bytes sent.
pub fn sendmsg_with_fds(fd: BorrowedFd, payload: &[u8], fds: &[BorrowedFd])
    -> io::Result<usize>
{
    let mut iov = libc::iovec{
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len:  payload.len(),
    };

    // SAFETY: CMSG_SPACE is a pure arithmetic macro.
    let cmsg_space = unsafe {
        libc::CMSG_SPACE((size_of::<libc::c_int>() * fds.len()) as u32)
    } as usize;

    // u64 elements guarantee correct alignment of the cmsghdr within.
    let mut cmsg_buf = vec![0u64; cmsg_space.div_ceil(size_of::<u64>())];

    // SAFETY: All-zeroes is a valid msghdr.
    let mut msg = unsafe { zeroed::<libc::msghdr>() };
    msg.msg_iov        = &mut iov;
    msg.msg_iovlen     = 1;
    msg.msg_control    = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_space;

    // SAFETY: msg_control is non-null and large enough.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type  = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len   =
            libc::CMSG_LEN((size_of::<libc::c_int>() * fds.len()) as u32)
            as _;
        let data = libc::CMSG_DATA(cmsg) as *mut libc::c_int;
        for (i, passed) in fds.iter().enumerate() {
            data.add(i).write_unaligned(passed.as_raw_fd());
        }
    }

    retry_on_eintr(|| {
        // SAFETY: msg and everything it points to are initialized above.
        let sent = unsafe { libc::sendmsg(fd.as_raw_fd(), &msg, 0) };

        if sent == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(sent as usize)
    })
}

/// Call recvmsg(2), receiving file descriptors from the ancillary data.
///
/// Returns the number of payload bytes received, the descriptors carried
/// by `SCM_RIGHTS` control messages (at most `max_fds` are expected),
/// and the address of the sender if the socket is unconnected.
pub fn recvmsg_with_fds(fd: BorrowedFd, payload: &mut [u8], max_fds: usize)
    -> io::Result<(usize, Vec<OwnedFd>, Option<UnixAddr>)>
{
    let mut iov = libc::iovec{
        iov_base: payload.as_mut_ptr() as *mut libc::c_void,
        iov_len:  payload.len(),
    };

    // SAFETY: CMSG_SPACE is a pure arithmetic macro.
    let cmsg_space = unsafe {
        libc::CMSG_SPACE((size_of::<libc::c_int>() * max_fds) as u32)
    } as usize;

    let mut cmsg_buf = vec![0u64; cmsg_space.div_ceil(size_of::<u64>())];

    // SAFETY: All-zeroes is a valid sockaddr_un and a valid msghdr.
    let mut source = unsafe { zeroed::<libc::sockaddr_un>() };
    let mut msg = unsafe { zeroed::<libc::msghdr>() };
    msg.msg_name       = &mut source as *mut libc::sockaddr_un
                         as *mut libc::c_void;
    msg.msg_namelen    = size_of::<libc::sockaddr_un>() as libc::socklen_t;
    msg.msg_iov        = &mut iov;
    msg.msg_iovlen     = 1;
    msg.msg_control    = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_space;

    let received = retry_on_eintr(|| {
        // SAFETY: msg and everything it points to are initialized above.
        let received = unsafe {
            libc::recvmsg(fd.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC)
        };

        if received == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(received as usize)
    })?;

    // Collect the descriptors from every SCM_RIGHTS control message.
    let mut fds = Vec::new();
    // SAFETY: The kernel initialized the control messages it reports.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET
                && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data_len = (*cmsg).cmsg_len as usize
                               - (libc::CMSG_LEN(0) as usize);
                let count = data_len / size_of::<libc::c_int>();
                let data = libc::CMSG_DATA(cmsg) as *const libc::c_int;
                for i in 0 .. count {
                    let raw = data.add(i).read_unaligned();
                    fds.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&mut msg, cmsg);
        }
    }

    let source =
        if msg.msg_namelen as usize > size_of::<libc::sa_family_t>() {
            Some(UnixAddr{addr: source, len: msg.msg_namelen})
        } else {
            None
        };

    Ok((received, fds, source))
}

/// Call sendto(2) with the given arguments.
pub fn sendto(fd: BorrowedFd, payload: &[u8], addr: &UnixAddr)
    -> io::Result<usize>
{
    retry_on_eintr(|| {
        // SAFETY: addr points to a valid sockaddr_un of the stated length.
        let sent = unsafe {
            libc::sendto(
                fd.as_raw_fd(),
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
                0,
                addr.as_ptr(),
                addr.len,
            )
        };

        if sent == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(sent as usize)
    })
}

/// Call recv(2) with the given arguments.
pub fn recv(fd: BorrowedFd, payload: &mut [u8]) -> io::Result<usize>
{
    retry_on_eintr(|| {
        // SAFETY: payload is valid for writes of its length.
        let received = unsafe {
            libc::recv(
                fd.as_raw_fd(),
                payload.as_mut_ptr() as *mut libc::c_void,
                payload.len(),
                0,
            )
        };

        if received == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(received as usize)
    })
}
