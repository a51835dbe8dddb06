use std::{ffi::CStr, io, mem::MaybeUninit};

/// Call stat(2) with the given arguments.
pub fn stat(pathname: &CStr) -> io::Result<libc::stat>
{
    let mut statbuf = MaybeUninit::uninit();

    // SAFETY: pathname is NUL-terminated.
    let result = unsafe {
        libc::stat(pathname.as_ptr(), statbuf.as_mut_ptr())
    };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: stat initialized statbuf.
    Ok(unsafe { statbuf.assume_init() })
}
