//! Sending signals and installing signal handlers.

use std::{io, mem::zeroed};

/// A signal handler installable with [`sigaction`].
///
/// The handler runs in signal context and may therefore only call
/// async-signal-safe functions; see signal-safety(7).
pub type Handler = extern "C" fn(libc::c_int);

/// Call sigaction(2), installing a handler for the given signal.
///
/// Returns the previously installed disposition,
/// for later use with [`sigaction_restore`].
pub fn sigaction(signum: libc::c_int, handler: Handler)
    -> io::Result<libc::sigaction>
{
    // SAFETY: All-zeroes is a valid sigaction with an empty mask.
    let mut new = unsafe { zeroed::<libc::sigaction>() };
    new.sa_sigaction = handler as usize;

    let mut old = unsafe { zeroed::<libc::sigaction>() };

    // SAFETY: new and old point to valid sigaction structures.
    let result = unsafe { libc::sigaction(signum, &new, &mut old) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(old)
}

/// Call sigaction(2), restoring a previously saved disposition.
pub fn sigaction_restore(signum: libc::c_int, old: &libc::sigaction)
    -> io::Result<()>
{
    // SAFETY: old points to a sigaction obtained from [`sigaction`].
    let result = unsafe { libc::sigaction(signum, old, std::ptr::null_mut()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
