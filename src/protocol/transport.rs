//! Byte transports the framer reads from.
//!
//! A [`Connection`] supports the two-phase read the framer relies on: a
//! non-consuming peek bounded by a timeout, then one consuming read of the
//! computed frame length.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

/// Largest datagram the protocol produces, with headroom.
const MAX_DATAGRAM: usize = 2048;

/// Transport capable of look-ahead reads.
pub trait Connection {
    /// Copy pending bytes into `buf` without consuming them, waiting up to
    /// `timeout` for data to arrive.
    fn peek(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Consume up to `buf.len()` bytes of the current message. Returns fewer
    /// bytes when the message is shorter.
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send one complete message to the peer.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Drop pending input that could not be framed.
    fn discard(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Socket read timeouts must be nonzero.
fn read_timeout(timeout: Duration) -> Option<Duration> {
    Some(timeout.max(Duration::from_millis(1)))
}

/// A UDP endpoint. Each datagram is one message; replies go to the sender
/// of the last datagram seen, or to the fixed peer of a client socket.
#[derive(Debug)]
pub struct UdpConnection {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpConnection {
    /// Wrap a bound server socket.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket, peer: None }
    }

    /// A client socket talking to `peer`.
    pub fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            peer: Some(peer),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender of the last datagram peeked or read.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Connection for UdpConnection {
    fn peek(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.socket.set_read_timeout(read_timeout(timeout))?;
        let (n, from) = self.socket.peek_from(buf)?;
        self.peer = Some(from);
        Ok(n)
    }

    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket.recv_from(buf)?;
        self.peer = Some(from);
        Ok(n)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no peer to reply to"))?;
        self.socket.send_to(bytes, peer)?;
        Ok(())
    }

    fn discard(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; MAX_DATAGRAM];
        self.socket.recv_from(&mut scratch)?;
        Ok(())
    }
}

impl Connection for TcpStream {
    fn peek(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.set_read_timeout(read_timeout(timeout))?;
        TcpStream::peek(self, buf)
    }

    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    break
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_udp_peek_does_not_consume() {
        let mut server = UdpConnection::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let mut client = UdpConnection::connect(server.local_addr().unwrap()).unwrap();
        client.send(b"LREQ\r\ncontent-length: 0\r\n").unwrap();

        let mut head = [0u8; 4];
        let n = server.peek(&mut head, Duration::from_secs(2)).unwrap();
        assert_eq!(&head[..n], b"LREQ");
        assert_eq!(
            server.peer().map(|addr| addr.port()),
            Some(client.local_addr().unwrap().port())
        );

        let mut frame = [0u8; 64];
        let n = server.read_frame(&mut frame).unwrap();
        assert_eq!(&frame[..n], b"LREQ\r\ncontent-length: 0\r\n");
    }

    #[test]
    fn test_udp_peek_times_out() {
        let mut server = UdpConnection::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let mut buf = [0u8; 8];
        let err = server.peek(&mut buf, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn test_udp_discard_drops_datagram() {
        let mut server = UdpConnection::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let mut client = UdpConnection::connect(server.local_addr().unwrap()).unwrap();
        client.send(b"junk").unwrap();
        client.send(b"LREQ").unwrap();

        let mut buf = [0u8; 8];
        server.peek(&mut buf, Duration::from_secs(2)).unwrap();
        server.discard().unwrap();

        let n = server.peek(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(&buf[..n], b"LREQ");
    }

    #[test]
    fn test_tcp_read_frame_reports_short_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let writer = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.send(b"LREQ\r\n").unwrap();
        });

        let (mut stream, _) = listener.accept().unwrap();
        writer.join().unwrap();

        let mut head = [0u8; 4];
        let n = Connection::peek(&mut stream, &mut head, Duration::from_secs(2)).unwrap();
        assert_eq!(&head[..n], b"LREQ");

        let mut frame = [0u8; 25];
        assert_eq!(stream.read_frame(&mut frame).unwrap(), 6);
    }
}
