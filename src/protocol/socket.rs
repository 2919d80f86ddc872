use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{read_frame, write_frame, FrameBuffer, Reply, Request};
use crate::error::{Error, Result};

// -----------------------------------------------------------------------------
// REPLY SOCKET (SERVICE SIDE)
// -----------------------------------------------------------------------------

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    frames: FrameBuffer,
    closed: bool,
}

/// Server end of the channel. Serves a single client at a time and never
/// blocks while waiting for a request.
pub struct ReplySocket {
    listener: TcpListener,
    client: Option<Connection>,
}

impl ReplySocket {
    pub fn bind<A: ToSocketAddrs>(address: A) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            client: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Return the next pending request, if any, without blocking.
    pub fn poll(&mut self) -> Result<Option<Request>> {
        if self.client.is_none() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    info!(%peer, "client connected");
                    self.client = Some(Connection {
                        stream,
                        peer,
                        frames: FrameBuffer::new(),
                        closed: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        let Some(conn) = self.client.as_mut() else {
            return Ok(None);
        };

        let mut chunk = [0u8; 512];
        while !conn.closed {
            match conn.stream.read(&mut chunk) {
                Ok(0) => {
                    info!(peer = %conn.peer, "client disconnected");
                    conn.closed = true;
                }
                Ok(n) => conn.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(peer = %conn.peer, error = %e, "client connection failed");
                    conn.closed = true;
                }
            }
        }

        // Requests that arrived before a disconnect are still served.
        let next = conn.frames.next_frame();
        match next {
            Ok(Some(payload)) => return Ok(Some(Request::decode(&payload))),
            Ok(None) => {}
            Err(e) => {
                warn!(peer = %conn.peer, error = %e, "dropping client");
                conn.closed = true;
                conn.frames.clear();
            }
        }
        if conn.closed {
            self.client = None;
        }
        Ok(None)
    }

    pub fn send(&mut self, reply: &Reply) -> Result<()> {
        let conn = self
            .client
            .as_mut()
            .ok_or_else(|| Error::Protocol("no client to reply to".to_string()))?;

        conn.stream.set_nonblocking(false)?;
        let written = write_frame(&mut conn.stream, &reply.encode());
        conn.stream.set_nonblocking(true)?;
        written
    }
}

// -----------------------------------------------------------------------------
// REQUEST SOCKET (CLIENT SIDE)
// -----------------------------------------------------------------------------

/// Client end of the channel. Requests and replies strictly alternate; after
/// a failed or timed-out receive the socket refuses further use.
pub struct RequestSocket {
    stream: TcpStream,
    awaiting_reply: bool,
    poisoned: bool,
}

impl RequestSocket {
    pub fn connect(address: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(address)?;
        Self::from_stream(stream)
    }

    /// Keep retrying the connect until it succeeds or `timeout` elapses.
    pub fn connect_within(address: SocketAddr, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout("acquisition service connection"));
            }
            match TcpStream::connect_timeout(&address, remaining) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    debug!(%address, error = %e, "connect failed, retrying");
                    std::thread::sleep(Duration::from_millis(100).min(remaining));
                }
            }
        }
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            awaiting_reply: false,
            poisoned: false,
        })
    }

    pub fn send(&mut self, request: &Request) -> Result<()> {
        if self.poisoned {
            return Err(Error::Protocol("socket unusable after failed receive".into()));
        }
        if self.awaiting_reply {
            return Err(Error::Protocol(
                "cannot send while a reply is outstanding".to_string(),
            ));
        }
        if let Err(e) = write_frame(&mut self.stream, &request.encode()) {
            self.poisoned = true;
            return Err(e);
        }
        self.awaiting_reply = true;
        Ok(())
    }

    /// Wait for the reply to the last request; `None` waits indefinitely.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Result<Reply> {
        if !self.awaiting_reply {
            return Err(Error::Protocol("no request outstanding".to_string()));
        }
        self.stream.set_read_timeout(timeout)?;

        let payload = match read_frame(&mut self.stream) {
            Ok(payload) => payload,
            Err(e) => {
                self.poisoned = true;
                return Err(match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        Error::Timeout("acquisition service reply")
                    }
                    _ => e.into(),
                });
            }
        };
        self.awaiting_reply = false;
        Reply::decode(&payload)
    }

    pub fn request(&mut self, request: &Request, timeout: Option<Duration>) -> Result<Reply> {
        self.send(request)?;
        self.recv(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn poll_until_request(server: &mut ReplySocket) -> Request {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(request) = server.poll().unwrap() {
                return request;
            }
            assert!(Instant::now() < deadline, "no request arrived");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn poll_without_client_returns_nothing() {
        let mut server = ReplySocket::bind("127.0.0.1:0").unwrap();
        assert_eq!(server.poll().unwrap(), None);
    }

    #[test]
    fn request_reply_round_trip() {
        let mut server = ReplySocket::bind("127.0.0.1:0").unwrap();
        let address = server.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut socket = RequestSocket::connect(address).unwrap();
            let energy = socket.request(&Request::Energy, None).unwrap();
            let stopped = socket.request(&Request::Stop, None).unwrap();
            (energy, stopped)
        });

        assert_eq!(poll_until_request(&mut server), Request::Energy);
        server.send(&Reply::Energy(0.25)).unwrap();
        assert_eq!(poll_until_request(&mut server), Request::Stop);
        server.send(&Reply::Stopped).unwrap();

        let (energy, stopped) = client.join().unwrap();
        assert_eq!(energy, Reply::Energy(0.25));
        assert_eq!(stopped, Reply::Stopped);
    }

    #[test]
    fn second_send_without_reply_is_refused() {
        let server = ReplySocket::bind("127.0.0.1:0").unwrap();
        let mut socket = RequestSocket::connect(server.local_addr().unwrap()).unwrap();

        socket.send(&Request::Energy).unwrap();
        assert!(matches!(
            socket.send(&Request::Energy),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn unanswered_request_times_out_and_poisons_socket() {
        let server = ReplySocket::bind("127.0.0.1:0").unwrap();
        let mut socket = RequestSocket::connect(server.local_addr().unwrap()).unwrap();

        let result = socket.request(&Request::Stop, Some(Duration::from_millis(50)));
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(socket.send(&Request::Energy).is_err());
    }
}
