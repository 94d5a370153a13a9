//! Fixed-capacity connection slots and the per-slot I/O surface
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Binding accepted sockets to the first free slot
//! - Non-blocking reads and best-effort writes on behalf of handlers
//! - Closing connections and queueing the matching disconnect events
//! - Reporting which occupied sockets have data waiting
//!
//! Slot indices are stable for the lifetime of a connection and are reused
//! as soon as the connection is gone. Each binding also carries a serial
//! number so a readiness report taken before a slot was reused can never be
//! delivered to the new occupant.

use crate::error::ConnectionError;
use log::{info, warn};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::io::ReadBuf;
use tokio::net::TcpStream;

/// A live client connection bound to a slot
#[derive(Debug)]
pub struct Connection {
    /// Serial number distinguishing this binding from earlier ones
    pub serial: u64,
    /// Peer address recorded at accept time
    pub addr: SocketAddr,
    stream: TcpStream,
}

/// Fixed array of optional connections, indexed by slot
///
/// A slot is either free (`None`) or occupied by exactly one connection.
/// Handlers receive `&mut Slots` in every hook and use it to talk to
/// clients; disconnects triggered from inside a hook are recorded and
/// delivered to the handler by the daemon once the hook has returned.
#[derive(Debug)]
pub struct Slots {
    entries: Vec<Option<Connection>>,
    next_serial: u64,
    closed: VecDeque<usize>,
}

impl Slots {
    /// Creates a table with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            next_serial: 1,
            closed: VecDeque::new(),
        }
    }

    /// Total number of slots, free or not
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        matches!(self.entries.get(slot), Some(Some(_)))
    }

    /// Indices of all occupied slots in ascending order
    pub fn occupied(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn peer_addr(&self, slot: usize) -> Option<SocketAddr> {
        self.connection(slot).map(|conn| conn.addr)
    }

    pub fn serial(&self, slot: usize) -> Option<u64> {
        self.connection(slot).map(|conn| conn.serial)
    }

    fn connection(&self, slot: usize) -> Option<&Connection> {
        self.entries.get(slot).and_then(|entry| entry.as_ref())
    }

    /// Binds an accepted stream to the first free slot
    ///
    /// Returns the slot index, or hands the stream back when every slot is
    /// taken so the caller decides how to refuse it. The stream should have
    /// reported writable once, otherwise the first `write` sees no readiness
    /// and counts as short.
    pub fn bind(&mut self, stream: TcpStream, addr: SocketAddr) -> Result<usize, TcpStream> {
        let Some(slot) = self.entries.iter().position(|entry| entry.is_none()) else {
            return Err(stream);
        };

        let serial = self.next_serial;
        self.next_serial += 1;

        self.entries[slot] = Some(Connection {
            serial,
            addr,
            stream,
        });
        info!("Client {} connected from {}", slot, addr);

        Ok(slot)
    }

    /// Reads whatever is buffered for `slot` without waiting
    ///
    /// Returns the number of bytes read, never zero for a non-empty buffer.
    /// Nothing waiting is `NotReady` and leaves the slot open. End of stream
    /// or a read error disconnects the slot before the error is returned.
    pub fn read(&mut self, slot: usize, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let conn = self
            .connection(slot)
            .ok_or(ConnectionError::SlotFree { slot })?;

        match conn.stream.try_read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.disconnect(slot);
                Err(ConnectionError::Closed { slot })
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(ConnectionError::NotReady { slot })
            }
            Err(e) => {
                warn!("Read from client {} failed: {}", slot, e);
                self.disconnect(slot);
                Err(ConnectionError::Io { slot, source: e })
            }
        }
    }

    /// Writes all of `bytes` to `slot` or disconnects it
    ///
    /// Writing never waits for the peer: if the socket cannot take the whole
    /// buffer right now the write counts as short and the slot is dropped.
    pub fn write(&mut self, slot: usize, bytes: &[u8]) -> Result<(), ConnectionError> {
        let conn = self
            .connection(slot)
            .ok_or(ConnectionError::SlotFree { slot })?;

        let mut written = 0;
        while written < bytes.len() {
            match conn.stream.try_write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Write to client {} failed: {}", slot, e);
                    self.disconnect(slot);
                    return Err(ConnectionError::Io { slot, source: e });
                }
            }
        }

        if written < bytes.len() {
            warn!(
                "Write to client {} failed: {} of {} bytes sent",
                slot,
                written,
                bytes.len()
            );
            self.disconnect(slot);
            return Err(ConnectionError::ShortWrite {
                slot,
                written,
                expected: bytes.len(),
            });
        }

        Ok(())
    }

    /// Writes `bytes` to every occupied slot, dropping the ones that fail
    pub fn broadcast(&mut self, bytes: &[u8]) {
        for slot in self.occupied() {
            // A failed write has already disconnected the slot
            let _ = self.write(slot, bytes);
        }
    }

    /// Closes the connection in `slot` and frees it
    ///
    /// The disconnect hook for the slot runs after the current hook returns.
    /// Returns false if the slot was already free.
    pub fn disconnect(&mut self, slot: usize) -> bool {
        match self.entries.get_mut(slot).and_then(Option::take) {
            Some(conn) => {
                info!("Client {} disconnected ({})", slot, conn.addr);
                drop(conn);
                self.closed.push_back(slot);
                true
            }
            None => false,
        }
    }

    /// Next slot whose disconnect has not been reported to the handler yet
    pub(crate) fn take_closed(&mut self) -> Option<usize> {
        self.closed.pop_front()
    }

    /// Closes every connection without queueing disconnect events
    pub(crate) fn close_all(&mut self) {
        for entry in &mut self.entries {
            entry.take();
        }
        self.closed.clear();
    }

    /// Collects `(slot, serial)` for each occupied socket with data waiting
    ///
    /// Registers the task for wake-up on every socket that is not ready yet.
    /// Readiness is confirmed with a one-byte peek, which also clears a stale
    /// readiness flag left over from the last read. End of stream and socket
    /// errors count as ready so the handler's read observes them.
    pub(crate) fn poll_ready(&self, cx: &mut Context<'_>) -> Vec<(usize, u64)> {
        let mut probe = [0u8; 1];
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                let conn = entry.as_ref()?;
                let mut peek = ReadBuf::new(&mut probe);
                match conn.stream.poll_peek(cx, &mut peek) {
                    Poll::Ready(_) => Some((slot, conn.serial)),
                    Poll::Pending => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Opens a loopback connection and returns (server side, client side)
    async fn socket_pair() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        server.writable().await.unwrap();
        (server, peer, client)
    }

    /// Waits until `poll_ready` reports at least one slot
    async fn readable(slots: &Slots) -> Vec<(usize, u64)> {
        let wait = std::future::poll_fn(|cx| {
            let ready = slots.poll_ready(cx);
            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        });
        tokio::time::timeout(std::time::Duration::from_secs(2), wait)
            .await
            .expect("no slot became readable")
    }

    /// Polls once without waiting
    async fn ready_now(slots: &Slots) -> Vec<(usize, u64)> {
        std::future::poll_fn(|cx| Poll::Ready(slots.poll_ready(cx))).await
    }

    #[test]
    fn test_slots_start_free() {
        let slots = Slots::new(3);
        assert_eq!(slots.capacity(), 3);
        assert!(slots.is_empty());
        assert!(!slots.is_occupied(0));
        assert!(!slots.is_occupied(7));
        assert!(slots.occupied().is_empty());
    }

    #[tokio::test]
    async fn test_bind_uses_first_free_slot() {
        let mut slots = Slots::new(2);

        let (server, peer, _client) = socket_pair().await;
        assert_eq!(slots.bind(server, peer).unwrap(), 0);
        assert_eq!(slots.peer_addr(0), Some(peer));

        let (server, peer, _client2) = socket_pair().await;
        assert_eq!(slots.bind(server, peer).unwrap(), 1);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.occupied(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_bind_refuses_when_full() {
        let mut slots = Slots::new(1);

        let (server, peer, _client) = socket_pair().await;
        slots.bind(server, peer).unwrap();

        let (server, peer, _client2) = socket_pair().await;
        assert!(slots.bind(server, peer).is_err());
        assert_eq!(slots.len(), 1);
    }

    #[tokio::test]
    async fn test_freed_slot_is_reused_with_new_serial() {
        let mut slots = Slots::new(2);

        let (server, peer, _client) = socket_pair().await;
        slots.bind(server, peer).unwrap();
        let first_serial = slots.serial(0).unwrap();

        assert!(slots.disconnect(0));
        assert!(!slots.is_occupied(0));
        assert_eq!(slots.take_closed(), Some(0));
        assert_eq!(slots.take_closed(), None);

        let (server, peer, _client2) = socket_pair().await;
        assert_eq!(slots.bind(server, peer).unwrap(), 0);
        assert_ne!(slots.serial(0).unwrap(), first_serial);
    }

    #[tokio::test]
    async fn test_disconnect_free_slot_is_noop() {
        let mut slots = Slots::new(1);
        assert!(!slots.disconnect(0));
        assert_eq!(slots.take_closed(), None);
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let mut slots = Slots::new(1);
        let (server, peer, mut client) = socket_pair().await;
        slots.bind(server, peer).unwrap();

        slots.write(0, b"hello\0").unwrap();

        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\0");
    }

    #[tokio::test]
    async fn test_read_returns_buffered_bytes() {
        let mut slots = Slots::new(1);
        let (server, peer, mut client) = socket_pair().await;
        slots.bind(server, peer).unwrap();

        client.write_all(b"wasd").await.unwrap();

        let mut buf = [0u8; 16];
        let mut total = 0;
        while total < 4 {
            readable(&slots).await;
            total += slots.read(0, &mut buf[total..]).unwrap();
        }
        assert_eq!(&buf[..total], b"wasd");
        assert!(slots.is_occupied(0));
    }

    #[tokio::test]
    async fn test_readiness_clears_once_drained() {
        let mut slots = Slots::new(1);
        let (server, peer, mut client) = socket_pair().await;
        slots.bind(server, peer).unwrap();
        let serial = slots.serial(0).unwrap();

        assert!(ready_now(&slots).await.is_empty());

        client.write_all(b"s").await.unwrap();
        assert_eq!(readable(&slots).await, vec![(0, serial)]);

        let mut buf = [0u8; 16];
        assert_eq!(slots.read(0, &mut buf).unwrap(), 1);
        assert!(ready_now(&slots).await.is_empty());
        assert!(matches!(
            slots.read(0, &mut buf),
            Err(ConnectionError::NotReady { slot: 0 })
        ));
        assert!(slots.is_occupied(0));
    }

    #[tokio::test]
    async fn test_read_end_of_stream_disconnects() {
        let mut slots = Slots::new(1);
        let (server, peer, client) = socket_pair().await;
        slots.bind(server, peer).unwrap();
        drop(client);

        readable(&slots).await;
        let mut buf = [0u8; 16];
        match slots.read(0, &mut buf) {
            Err(ConnectionError::Closed { slot }) => assert_eq!(slot, 0),
            Err(ConnectionError::Io { slot, .. }) => assert_eq!(slot, 0),
            other => panic!("Expected closed connection, got {:?}", other),
        }
        assert!(!slots.is_occupied(0));
        assert_eq!(slots.take_closed(), Some(0));
    }

    #[tokio::test]
    async fn test_io_on_free_slot_is_rejected() {
        let mut slots = Slots::new(1);
        let mut buf = [0u8; 4];

        assert!(matches!(
            slots.read(0, &mut buf),
            Err(ConnectionError::SlotFree { slot: 0 })
        ));
        assert!(matches!(
            slots.write(0, b"x"),
            Err(ConnectionError::SlotFree { slot: 0 })
        ));
        assert_eq!(slots.take_closed(), None);
    }

    #[tokio::test]
    async fn test_close_all_drops_without_events() {
        let mut slots = Slots::new(2);
        let (server, peer, _client) = socket_pair().await;
        slots.bind(server, peer).unwrap();

        slots.close_all();
        assert!(slots.is_empty());
        assert_eq!(slots.take_closed(), None);
    }
}
