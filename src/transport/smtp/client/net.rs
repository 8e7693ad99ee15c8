use std::{
    fmt,
    io::{self, Read, Write},
    mem,
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};

use super::TlsParameters;
use crate::transport::{error, Error};

/// A network stream
pub struct NetworkStream {
    inner: InnerNetworkStream,
}

/// Represents the different types of underlying network streams
#[allow(clippy::large_enum_variant)]
enum InnerNetworkStream {
    /// Plain TCP stream
    Tcp(TcpStream),
    /// Encrypted TCP stream
    Tls(native_tls::TlsStream<TcpStream>),
    /// Left behind by a failed TLS upgrade
    None,
}

impl NetworkStream {
    fn new(inner: InnerNetworkStream) -> Self {
        if let InnerNetworkStream::None = inner {
            debug_assert!(false, "InnerNetworkStream::None must never be built");
        }

        NetworkStream { inner }
    }

    /// Shutdowns the connection
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match &self.inner {
            InnerNetworkStream::Tcp(s) => s.shutdown(how),
            InnerNetworkStream::Tls(s) => s.get_ref().shutdown(how),
            InnerNetworkStream::None => Ok(()),
        }
    }

    /// Opens a TCP connection to the first reachable address of `server`,
    /// wrapping it in TLS right away when `tls_parameters` is given
    pub fn connect<T: ToSocketAddrs>(
        server: T,
        timeout: Option<Duration>,
        tls_parameters: Option<&TlsParameters>,
    ) -> Result<NetworkStream, Error> {
        fn try_connect<T: ToSocketAddrs>(
            server: T,
            timeout: Option<Duration>,
        ) -> Result<TcpStream, Error> {
            let addrs = server.to_socket_addrs().map_err(error::connection)?;

            let mut last_err = None;

            for addr in addrs {
                let socket = Socket::new(
                    Domain::for_address(addr),
                    Type::STREAM,
                    Some(Protocol::TCP),
                )
                .map_err(error::connection)?;

                let connected = match timeout {
                    Some(timeout) => socket.connect_timeout(&addr.into(), timeout),
                    None => socket.connect(&addr.into()),
                };

                match connected {
                    Ok(()) => return Ok(TcpStream::from(socket)),
                    Err(err) => last_err = Some(err),
                }
            }

            Err(match last_err {
                Some(last_err) => error::connection(last_err),
                None => error::connection("could not resolve to any supported address"),
            })
        }

        let tcp_stream = try_connect(server, timeout)?;
        // bounds the TLS handshake too
        tcp_stream
            .set_read_timeout(timeout)
            .and_then(|()| tcp_stream.set_write_timeout(timeout))
            .map_err(error::connection)?;
        let mut stream = NetworkStream::new(InnerNetworkStream::Tcp(tcp_stream));
        if let Some(tls_parameters) = tls_parameters {
            stream.upgrade_tls(tls_parameters)?;
        }
        Ok(stream)
    }

    /// Wraps the plain TCP stream in TLS, after `STARTTLS` or on connect
    pub fn upgrade_tls(&mut self, tls_parameters: &TlsParameters) -> Result<(), Error> {
        match mem::replace(&mut self.inner, InnerNetworkStream::None) {
            InnerNetworkStream::Tcp(tcp_stream) => {
                let tls_stream = tls_parameters
                    .connector()
                    .connect(tls_parameters.domain(), tcp_stream)
                    .map_err(|err| error::connection(err.to_string()))?;
                self.inner = InnerNetworkStream::Tls(tls_stream);
                Ok(())
            }
            other => {
                self.inner = other;
                Ok(())
            }
        }
    }

    /// Tells if the stream is encrypted
    pub fn is_encrypted(&self) -> bool {
        match self.inner {
            InnerNetworkStream::Tcp(_) => false,
            InnerNetworkStream::Tls(_) => true,
            InnerNetworkStream::None => false,
        }
    }

    /// Set read timeout for IO calls
    pub fn set_read_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        match &mut self.inner {
            InnerNetworkStream::Tcp(stream) => stream.set_read_timeout(duration),
            InnerNetworkStream::Tls(stream) => stream.get_ref().set_read_timeout(duration),
            InnerNetworkStream::None => Err(not_connected()),
        }
    }

    /// Set write timeout for IO calls
    pub fn set_write_timeout(&mut self, duration: Option<Duration>) -> io::Result<()> {
        match &mut self.inner {
            InnerNetworkStream::Tcp(stream) => stream.set_write_timeout(duration),
            InnerNetworkStream::Tls(stream) => stream.get_ref().set_write_timeout(duration),
            InnerNetworkStream::None => Err(not_connected()),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "TLS upgrade failed")
}

impl fmt::Debug for NetworkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkStream")
            .field("encrypted", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

impl Read for NetworkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            InnerNetworkStream::Tcp(s) => s.read(buf),
            InnerNetworkStream::Tls(s) => s.read(buf),
            InnerNetworkStream::None => Err(not_connected()),
        }
    }
}

impl Write for NetworkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            InnerNetworkStream::Tcp(s) => s.write(buf),
            InnerNetworkStream::Tls(s) => s.write(buf),
            InnerNetworkStream::None => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            InnerNetworkStream::Tcp(s) => s.flush(),
            InnerNetworkStream::Tls(s) => s.flush(),
            InnerNetworkStream::None => Err(not_connected()),
        }
    }
}
