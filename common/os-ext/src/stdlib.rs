use std::{
    ffi::{CString, OsString},
    io,
    os::unix::ffi::OsStringExt,
    path::PathBuf,
};

/// Call mkdtemp(3) with the given template.
///
/// The template must end in `XXXXXX`,
/// which is replaced with a unique suffix.
pub fn mkdtemp(template: &str) -> io::Result<PathBuf>
{
    let template = CString::new(template)?;

    // CString::as_mut_ptr does not exist.
    let mut template = template.into_bytes_with_nul();

    // SAFETY: template is NUL-terminated.
    let ptr = unsafe {
        libc::mkdtemp(template.as_mut_ptr() as *mut libc::c_char)
    };

    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }

    // mkdtemp replaced the Xs in place; drop the terminating nul.
    template.pop();
    Ok(PathBuf::from(OsString::from_vec(template)))
}
