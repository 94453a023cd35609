//! Non-blocking UDP feed receiver.
//!
//! A single mio-polled socket delivering datagram payloads to a
//! caller-supplied sink. `WouldBlock` is quiescence, not an error; the
//! caller decides how long to wait and when to stop.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};

const RECEIVER: Token = Token(0);

/// Datagrams larger than this are not market data; the tail is truncated
/// by the OS on receive.
const RECV_BUFFER_SIZE: usize = 65_536;

pub struct UdpReceiver {
    poll: Poll,
    socket: UdpSocket,
    events: Events,
    buf: Box<[u8; RECV_BUFFER_SIZE]>,
}

impl UdpReceiver {
    /// Bind and register a non-blocking socket.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut socket = UdpSocket::bind(addr)?;
        poll.registry()
            .register(&mut socket, RECEIVER, Interest::READABLE)?;

        Ok(Self {
            poll,
            socket,
            events: Events::with_capacity(64),
            buf: Box::new([0u8; RECV_BUFFER_SIZE]),
        })
    }

    /// Join a multicast group on the given interface; exchange feeds are
    /// usually multicast.
    pub fn join_multicast_v4(
        &self,
        group: std::net::Ipv4Addr,
        interface: std::net::Ipv4Addr,
    ) -> io::Result<()> {
        self.socket.join_multicast_v4(&group, &interface)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait up to `timeout` for readiness, then drain every pending
    /// datagram into `sink`. Returns the number of datagrams delivered.
    pub fn poll<F>(&mut self, timeout: Option<Duration>, mut sink: F) -> io::Result<usize>
    where
        F: FnMut(&[u8]),
    {
        self.poll.poll(&mut self.events, timeout)?;
        if self.events.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        loop {
            match self.socket.recv_from(&mut self.buf[..]) {
                Ok((n, _from)) => {
                    sink(&self.buf[..n]);
                    delivered += 1;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receives_datagrams_on_loopback() {
        let mut receiver = UdpReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = receiver.local_addr().unwrap();

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"frame-1", addr).unwrap();
        sender.send_to(b"frame-2", addr).unwrap();

        let mut payloads = Vec::new();
        let mut attempts = 0;
        while payloads.len() < 2 && attempts < 50 {
            receiver
                .poll(Some(Duration::from_millis(100)), |payload| {
                    payloads.push(payload.to_vec());
                })
                .unwrap();
            attempts += 1;
        }

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], b"frame-1");
        assert_eq!(payloads[1], b"frame-2");
    }

    #[test]
    fn timeout_with_no_traffic_delivers_nothing() {
        let mut receiver = UdpReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let delivered = receiver
            .poll(Some(Duration::from_millis(10)), |_| {
                panic!("no datagram expected")
            })
            .unwrap();
        assert_eq!(delivered, 0);
    }
}
