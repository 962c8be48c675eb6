//! The request server: answers each load request with a statistics snapshot.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::Duration;

use les_types::MessageKind;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::error::ProtocolError;
use crate::estimator::LoadEstimator;
use crate::protocol::{encode_response, Connection, MessageFramer, Protocol, UdpConnection};
use crate::shutdown::Shutdown;

/// Bound listening endpoint.
#[derive(Debug)]
enum Listener {
    Udp(UdpConnection),
    Tcp(TcpListener),
}

/// Counters reported when the server exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Load responses sent.
    pub served: u64,
    /// Messages dropped as unframeable or not a load request.
    pub dropped: u64,
}

/// Serves LREQ messages until shutdown.
///
/// Over UDP every datagram is an independent request. Over TCP connections
/// are accepted one at a time and each serves a single request.
#[derive(Debug)]
pub struct RequestServer {
    listener: Listener,
    estimator: Arc<LoadEstimator>,
    framer: MessageFramer,
    shutdown: Shutdown,
    stats: ServerStats,
}

impl RequestServer {
    /// Bind `addr` with address reuse enabled.
    ///
    /// `timeout` bounds every wait, so the server notices shutdown within
    /// about that long.
    pub fn bind(
        protocol: Protocol,
        addr: SocketAddr,
        estimator: Arc<LoadEstimator>,
        shutdown: Shutdown,
        timeout: Duration,
    ) -> io::Result<Self> {
        let domain = Domain::for_address(addr);
        let listener = match protocol {
            Protocol::Udp => {
                let socket = Socket::new(domain, Type::DGRAM, Some(socket2::Protocol::UDP))?;
                socket.set_reuse_address(true)?;
                socket.bind(&addr.into())?;
                Listener::Udp(UdpConnection::new(UdpSocket::from(socket)))
            }
            Protocol::Tcp => {
                let socket = Socket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;
                socket.set_reuse_address(true)?;
                socket.bind(&addr.into())?;
                socket.listen(128)?;
                Listener::Tcp(TcpListener::from(socket))
            }
        };

        Ok(Self {
            listener,
            estimator,
            framer: MessageFramer::new(timeout),
            shutdown,
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Listener::Udp(conn) => conn.local_addr(),
            Listener::Tcp(listener) => listener.local_addr(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.listener {
            Listener::Udp(_) => Protocol::Udp,
            Listener::Tcp(_) => Protocol::Tcp,
        }
    }

    /// Serve until shutdown is requested.
    pub fn run(mut self) -> io::Result<ServerStats> {
        info!(addr = %self.local_addr()?, protocol = %self.protocol(), "serving load requests");

        while self.shutdown.is_running() {
            match &mut self.listener {
                Listener::Udp(conn) => {
                    let outcome = serve_one(&self.framer, &self.estimator, conn);
                    tally(&mut self.stats, outcome, conn);
                }
                Listener::Tcp(listener) => {
                    let Some(mut stream) = accept(listener, self.framer.timeout())? else {
                        continue;
                    };
                    let outcome = serve_one(&self.framer, &self.estimator, &mut stream);
                    tally(&mut self.stats, outcome, &mut stream);
                }
            }
        }

        info!(
            served = self.stats.served,
            dropped = self.stats.dropped,
            "request server stopped"
        );
        Ok(self.stats)
    }
}

/// Count an outcome, discarding input that could not be framed.
fn tally<C: Connection + ?Sized>(
    stats: &mut ServerStats,
    outcome: Result<bool, ProtocolError>,
    conn: &mut C,
) {
    match outcome {
        Ok(true) => stats.served += 1,
        Ok(false) => stats.dropped += 1,
        Err(e) if e.is_timeout() => {}
        Err(e) => {
            debug!(error = %e, "dropping message");
            stats.dropped += 1;
            // A short frame has already been consumed
            if !matches!(e, ProtocolError::ShortRead { .. } | ProtocolError::Io(_)) {
                if let Err(e) = conn.discard() {
                    warn!(error = %e, "could not discard pending input");
                }
            }
        }
    }
}

/// Receive one message and answer it if it is a load request. Returns
/// whether a response was sent.
fn serve_one<C: Connection + ?Sized>(
    framer: &MessageFramer,
    estimator: &LoadEstimator,
    conn: &mut C,
) -> Result<bool, ProtocolError> {
    let frame = framer.receive(conn)?;
    if frame.kind != MessageKind::LoadRequest {
        debug!(kind = %frame.kind, "ignoring message that is not a load request");
        return Ok(false);
    }

    let info = estimator.snapshot();
    conn.send(&encode_response(&info))?;
    trace!(status = %info.status, load = info.load_type, "load response sent");
    Ok(true)
}

/// Wait up to `timeout` for a connection.
fn accept(listener: &TcpListener, timeout: Duration) -> io::Result<Option<TcpStream>> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) | Err(nix::Error::EINTR) => return Ok(None),
        Ok(_) => {}
        Err(e) => return Err(e.into()),
    }

    match listener.accept() {
        Ok((stream, peer)) => {
            trace!(%peer, "client connected");
            Ok(Some(stream))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => {
            warn!(error = %e, "accept failed");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorParams;
    use crate::protocol::codec::decode_response;
    use crate::protocol::encode_request;
    use crate::protocol::framer::tests::MemoryConnection;
    use les_types::Status;
    use std::io::{Read, Write};
    use std::thread;

    fn estimator() -> Arc<LoadEstimator> {
        let est = LoadEstimator::new(EstimatorParams::default(), |_| 0.5);
        est.set_status(Status::OK);
        est.update(200_000);
        Arc::new(est)
    }

    fn framer() -> MessageFramer {
        MessageFramer::new(Duration::from_millis(10))
    }

    #[test]
    fn test_serve_one_answers_load_request() {
        let est = estimator();
        let mut conn = MemoryConnection::with(&encode_request());

        assert!(serve_one(&framer(), &est, &mut conn).unwrap());
        let info = decode_response(&conn.sent).unwrap();
        assert_eq!(info.status, Status::OK);
        assert_eq!(info.nsamples, 1);
        assert_eq!(info.max, 200_000);
    }

    #[test]
    fn test_serve_one_ignores_responses() {
        let est = estimator();
        let mut conn = MemoryConnection::with(&encode_response(&est.snapshot()));

        assert!(!serve_one(&framer(), &est, &mut conn).unwrap());
        assert!(conn.sent.is_empty());
    }

    #[test]
    fn test_unknown_message_is_discarded() {
        let est = estimator();
        let mut stats = ServerStats::default();
        let mut conn = MemoryConnection::with(b"GET / HTTP/1.0\r\n\r\n");

        let outcome = serve_one(&framer(), &est, &mut conn);
        tally(&mut stats, outcome, &mut conn);

        assert!(conn.pending.is_empty());
        assert!(conn.sent.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn timeouts_are_not_counted() {
        let est = estimator();
        let mut stats = ServerStats::default();
        let mut conn = MemoryConnection::default();

        let outcome = serve_one(&framer(), &est, &mut conn);
        tally(&mut stats, outcome, &mut conn);
        assert_eq!(stats, ServerStats::default());
    }

    fn spawn_server(protocol: Protocol) -> (SocketAddr, Shutdown, thread::JoinHandle<ServerStats>) {
        let shutdown = Shutdown::new();
        let server = RequestServer::bind(
            protocol,
            "127.0.0.1:0".parse().unwrap(),
            estimator(),
            shutdown.clone(),
            Duration::from_millis(20),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.run().unwrap());
        (addr, shutdown, handle)
    }

    #[test]
    fn test_udp_round_trip() {
        let (addr, shutdown, handle) = spawn_server(Protocol::Udp);
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        socket.send_to(b"garbage", addr).unwrap();
        socket.send_to(&encode_request(), addr).unwrap();

        let mut buf = [0u8; 512];
        let (n, _) = socket.recv_from(&mut buf).unwrap();
        let info = decode_response(&buf[..n]).unwrap();
        assert_eq!(info.status, Status::OK);
        assert_eq!(info.nsamples, 1);

        shutdown.request_stop();
        let stats = handle.join().unwrap();
        assert_eq!(stats.served, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_tcp_serves_one_request_per_connection() {
        let (addr, shutdown, handle) = spawn_server(Protocol::Tcp);

        for _ in 0..2 {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            stream.write_all(&encode_request()).unwrap();

            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            let info = decode_response(&response).unwrap();
            assert_eq!(info.max, 200_000);
        }

        shutdown.request_stop();
        let stats = handle.join().unwrap();
        assert_eq!(stats.served, 2);
    }
}
