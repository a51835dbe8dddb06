//! The datagram channel between build client and build server.
//!
//! Both sides bind `AF_UNIX` datagram sockets at well-known names in
//! the working directory. The request datagram carries the client's
//! serialized [`Fingerprint`][`crate::Fingerprint`] as payload and its
//! three standard streams as `SCM_RIGHTS` ancillary data; replies are
//! single 4-byte little-endian integers addressed back to the client.

use {
    os_ext::{self, UnixAddr},
    std::{
        ffi::{CStr, CString},
        io,
        os::unix::io::{AsFd, BorrowedFd, OwnedFd},
    },
};

/// Where the server binds its socket, relative to the working directory.
pub const SERVER_SOCKET_PATH: &CStr = c"./.graupel-ipc-server";

/// Where a client binds its socket, relative to the working directory.
///
/// Unlinked and rebound on every invocation.
pub const CLIENT_SOCKET_PATH: &CStr = c"./.graupel-ipc-client";

/// Upper bound on the request payload.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024;

/// One build request, as the server receives it.
pub struct Request
{
    /// The client's serialized fingerprint.
    pub state: Vec<u8>,

    /// The client's stdin, stdout, and stderr, in that order.
    pub std_fds: [OwnedFd; 3],

    /// Where replies for this request go.
    pub source: UnixAddr,
}

/// The server's end of the channel.
pub struct ServerTransport
{
    socket: OwnedFd,
}

impl ServerTransport
{
    /// Create the server socket, replacing any stale one.
    pub fn bind(path: &CStr) -> io::Result<Self>
    {
        let socket = os_ext::socket_unix_dgram()?;
        let _ = os_ext::unlink(path);
        os_ext::bind(socket.as_fd(), &UnixAddr::new(path)?)?;
        Ok(Self{socket})
    }

    /// Block until a request arrives.
    ///
    /// A datagram that does not carry exactly three standard streams
    /// or no reply address is malformed and reported as an error.
    pub fn recv_request(&self) -> io::Result<Request>
    {
        let mut payload = vec![0; MAX_MESSAGE_SIZE];
        let (len, fds, source) =
            os_ext::recvmsg_with_fds(self.socket.as_fd(), &mut payload, 3)?;
        payload.truncate(len);

        let std_fds: [OwnedFd; 3] = match fds.try_into() {
            Ok(std_fds) => std_fds,
            Err(_) => return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "build request did not carry exactly three standard streams",
            )),
        };

        let source = source.ok_or_else(|| io::Error::new(
            io::ErrorKind::InvalidData,
            "build request carried no reply address",
        ))?;

        Ok(Request{state: payload, std_fds, source})
    }

    /// Send one 4-byte reply to the requester.
    pub fn send_reply(&self, source: &UnixAddr, value: i32) -> io::Result<()>
    {
        let bytes = value.to_le_bytes();
        let sent = os_ext::sendto(self.socket.as_fd(), &bytes, source)?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on build server reply",
            ));
        }
        Ok(())
    }
}

/// The client's end of the channel.
///
/// Dropping it removes the client socket from the file system.
pub struct ClientTransport
{
    socket: OwnedFd,
    path:   CString,
}

impl ClientTransport
{
    /// Bind the client socket (rebinding over any stale one)
    /// and aim it at the server socket.
    ///
    /// Fails if there is no server socket to aim at.
    pub fn connect(client_path: &CStr, server_path: &CStr) -> io::Result<Self>
    {
        let _ = os_ext::unlink(client_path);

        let socket = os_ext::socket_unix_dgram()?;
        os_ext::bind(socket.as_fd(), &UnixAddr::new(client_path)?)?;

        // From here on, Drop cleans up the bound socket.
        let this = Self{socket, path: client_path.to_owned()};
        os_ext::connect(this.socket.as_fd(), &UnixAddr::new(server_path)?)?;
        Ok(this)
    }

    /// Send the build request.
    ///
    /// `std_fds` are the stdin, stdout, and stderr to hand to the
    /// worker, in that order.
    pub fn send_request(&self, state: &[u8], std_fds: [BorrowedFd; 3])
        -> io::Result<()>
    {
        if state.len() > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "state fingerprint exceeds the message size cap",
            ));
        }

        let sent =
            os_ext::sendmsg_with_fds(self.socket.as_fd(), state, &std_fds)?;
        if sent != state.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on build request",
            ));
        }
        Ok(())
    }

    /// Block until the server sends a 4-byte reply.
    pub fn recv_reply(&self) -> io::Result<i32>
    {
        let mut bytes = [0; 4];
        let len = os_ext::recv(self.socket.as_fd(), &mut bytes)?;
        if len != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "short reply from build server",
            ));
        }
        Ok(i32::from_le_bytes(bytes))
    }

    /// Remove the client socket from the file system now.
    ///
    /// Also happens on drop; this exists for paths that leave the
    /// process without unwinding.
    pub fn unlink(&self)
    {
        let _ = os_ext::unlink(&self.path);
    }
}

impl Drop for ClientTransport
{
    fn drop(&mut self)
    {
        let _ = os_ext::unlink(&self.path);
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        os_ext::{mkdtemp, pipe2},
        std::{
            fs::File,
            io::{Read, Write},
            os::unix::ffi::OsStringExt,
            path::Path,
        },
    };

    fn socket_path(dir: &Path, name: &str) -> CString
    {
        CString::new(dir.join(name).into_os_string().into_vec()).unwrap()
    }

    #[test]
    fn request_reply_round_trip()
    {
        let dir = mkdtemp("/tmp/graupel-ipc-test-XXXXXX").unwrap();
        let server_path = socket_path(&dir, ".graupel-ipc-server");
        let client_path = socket_path(&dir, ".graupel-ipc-client");

        let server = ServerTransport::bind(&server_path).unwrap();
        let client =
            ClientTransport::connect(&client_path, &server_path).unwrap();

        // The demo request passes both ends of a pipe and stderr.
        let (pipe_r, pipe_w) = pipe2(0).unwrap();
        client.send_request(
            b"state bytes",
            [pipe_r.as_fd(), pipe_w.as_fd(), pipe_w.as_fd()],
        ).unwrap();

        let request = server.recv_request().unwrap();
        assert_eq!(request.state, b"state bytes");

        // The passed descriptor writes into the same pipe.
        drop(pipe_w);
        let [_, received_w, _] = request.std_fds;
        File::from(received_w).write_all(b"via scm_rights").unwrap();
        let mut read_back = String::new();
        File::from(pipe_r).read_to_string(&mut read_back).unwrap();
        assert_eq!(read_back, "via scm_rights");

        // Replies arrive in order: worker pid, then exit code.
        server.send_reply(&request.source, 4321).unwrap();
        server.send_reply(&request.source, 7).unwrap();
        assert_eq!(client.recv_reply().unwrap(), 4321);
        assert_eq!(client.recv_reply().unwrap(), 7);
    }

    #[test]
    fn connect_requires_a_server()
    {
        let dir = mkdtemp("/tmp/graupel-ipc-test-XXXXXX").unwrap();
        let server_path = socket_path(&dir, ".graupel-ipc-server");
        let client_path = socket_path(&dir, ".graupel-ipc-client");

        let result = ClientTransport::connect(&client_path, &server_path);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_state_is_rejected()
    {
        let dir = mkdtemp("/tmp/graupel-ipc-test-XXXXXX").unwrap();
        let server_path = socket_path(&dir, ".graupel-ipc-server");
        let client_path = socket_path(&dir, ".graupel-ipc-client");

        let _server = ServerTransport::bind(&server_path).unwrap();
        let client =
            ClientTransport::connect(&client_path, &server_path).unwrap();

        let huge = vec![0; MAX_MESSAGE_SIZE + 1];
        let (pipe_r, pipe_w) = pipe2(0).unwrap();
        let result = client.send_request(
            &huge,
            [pipe_r.as_fd(), pipe_w.as_fd(), pipe_w.as_fd()],
        );
        assert_eq!(
            result.unwrap_err().kind(),
            io::ErrorKind::InvalidInput,
        );
    }

    #[test]
    fn dropping_the_client_unlinks_its_socket()
    {
        let dir = mkdtemp("/tmp/graupel-ipc-test-XXXXXX").unwrap();
        let server_path = socket_path(&dir, ".graupel-ipc-server");
        let client_path = socket_path(&dir, ".graupel-ipc-client");

        let _server = ServerTransport::bind(&server_path).unwrap();
        let client =
            ClientTransport::connect(&client_path, &server_path).unwrap();

        assert!(dir.join(".graupel-ipc-client").exists());
        drop(client);
        assert!(!dir.join(".graupel-ipc-client").exists());
    }
}
