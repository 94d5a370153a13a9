//! Connection multiplexer: one listening socket, a fixed set of client slots
//! and a fixed-rate tick, all driven from a single loop

use crate::error::{ServerError, ServerResult};
use crate::slots::Slots;
use log::{debug, error, info, trace, warn};
use std::future::{poll_fn, Future};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{sleep_until, Instant};

/// Connections beyond slot capacity are refused, not queued
const LISTEN_BACKLOG: u32 = 0;

/// Event hooks the daemon dispatches to
///
/// Every hook runs on the daemon's loop and receives the slot table so it
/// can read from, write to or disconnect clients. A disconnect caused inside
/// a hook is reported through `on_disconnect` right after that hook returns.
pub trait Handler: Send {
    fn on_connect(&mut self, slots: &mut Slots, slot: usize);
    fn on_disconnect(&mut self, slots: &mut Slots, slot: usize);
    fn on_data(&mut self, slots: &mut Slots, slot: usize);
    fn on_tick(&mut self, slots: &mut Slots, tick: u32);

    /// Handler that should replace this one, checked after every hook
    fn successor(&mut self) -> Option<Box<dyn Handler>> {
        None
    }
}

/// Construction parameters for a [`Daemon`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Address to bind, `0.0.0.0` for any
    pub ip: Ipv4Addr,
    pub port: u16,
    /// Maximum number of concurrent clients
    pub slots: usize,
    /// Simulation steps per second
    pub ticks: u32,
}

impl DaemonConfig {
    pub fn new(ip: Ipv4Addr, port: u16, slots: usize, ticks: u32) -> Self {
        Self {
            ip,
            port,
            slots,
            ticks,
        }
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.slots == 0 {
            return Err(ServerError::Config(
                "slot count must be at least 1".to_string(),
            ));
        }
        if self.ticks == 0 {
            return Err(ServerError::Config(
                "tick rate must be at least 1 per second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Time between two ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.ticks.max(1)
    }
}

/// What ended one readiness wait
enum Wake {
    Shutdown,
    Timeout,
    Events {
        accepted: Option<io::Result<(TcpStream, SocketAddr)>>,
        ready: Vec<(usize, u64)>,
    },
}

/// Single-threaded TCP daemon multiplexing a fixed number of clients
///
/// Each loop iteration waits until the listener or an occupied client socket
/// is readable, or until the next tick is due. A wait that ends with nothing
/// readable fires the tick hook; otherwise a pending connection is accepted
/// first and then every readable client gets one data hook call.
pub struct Daemon {
    config: DaemonConfig,
    listener: Option<TcpListener>,
    slots: Slots,
    last_tick: Instant,
    tick: u32,
}

impl Daemon {
    /// Creates a daemon with every slot free; nothing is bound yet
    pub fn create(config: DaemonConfig) -> ServerResult<Self> {
        config.validate()?;

        Ok(Daemon {
            config,
            listener: None,
            slots: Slots::new(config.slots),
            last_tick: Instant::now(),
            tick: 0,
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Address actually bound, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Binds the listening socket with address reuse enabled
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&mut self) -> ServerResult<SocketAddr> {
        let addr = self.config.bind_addr();
        let bind_error = |source: io::Error| ServerError::Bind { addr, source };

        let socket = TcpSocket::new_v4().map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

        let local = listener.local_addr().map_err(bind_error)?;
        info!("Server listening on {}", local);

        self.listener = Some(listener);
        Ok(local)
    }

    /// Runs the loop until a fatal error
    pub async fn run(&mut self, handler: Box<dyn Handler>) -> ServerResult<()> {
        self.run_until(handler, std::future::pending()).await
    }

    /// Runs the loop until `shutdown` completes or a fatal error occurs
    ///
    /// Binds first if [`Daemon::listen`] has not been called. On the way out
    /// every client socket and the listener are closed, without firing
    /// disconnect hooks.
    pub async fn run_until<S>(
        &mut self,
        mut handler: Box<dyn Handler>,
        shutdown: S,
    ) -> ServerResult<()>
    where
        S: Future<Output = ()>,
    {
        if self.listener.is_none() {
            self.listen()?;
        }

        tokio::pin!(shutdown);

        self.last_tick = Instant::now();
        self.tick = 0;

        info!(
            "Daemon started: {} slots, {} ticks per second",
            self.config.slots, self.config.ticks
        );

        let result = loop {
            let Some(listener) = self.listener.as_ref() else {
                break Err(ServerError::Multiplex(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "listener closed",
                )));
            };

            let deadline = self.next_deadline();
            let wake = wait(listener, &self.slots, deadline, shutdown.as_mut()).await;

            match wake {
                Wake::Shutdown => {
                    info!("Daemon shutting down");
                    break Ok(());
                }
                Wake::Timeout => {
                    self.last_tick = Instant::now();
                    trace!("Tick {}", self.tick);
                    handler.on_tick(&mut self.slots, self.tick);
                    settle(&mut handler, &mut self.slots);
                    self.tick = (self.tick + 1) % self.config.ticks;
                }
                Wake::Events { accepted, ready } => {
                    if let Some(accepted) = accepted {
                        if let Err(e) = self.accept(accepted, &mut handler).await {
                            break Err(e);
                        }
                    }

                    for (slot, serial) in ready {
                        // The slot may have been freed or rebound since the wait
                        if self.slots.serial(slot) != Some(serial) {
                            continue;
                        }
                        handler.on_data(&mut self.slots, slot);
                        settle(&mut handler, &mut self.slots);
                    }
                }
            }
        };

        self.slots.close_all();
        self.listener = None;

        if let Err(e) = &result {
            error!("Daemon stopped: {}", e);
        }
        result
    }

    /// Deadline for the next tick, measured from the last one
    fn next_deadline(&self) -> Instant {
        let deadline = self.last_tick + self.config.tick_interval();
        let now = Instant::now();

        if now > deadline {
            warn!(
                "Could not reach tick rate of {}/s, {:?} behind",
                self.config.ticks,
                now - deadline
            );
            return now;
        }
        deadline
    }

    async fn accept(
        &mut self,
        accepted: io::Result<(TcpStream, SocketAddr)>,
        handler: &mut Box<dyn Handler>,
    ) -> ServerResult<()> {
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) if is_listener_failure(&e) => {
                error!("Listening socket failed: {}", e);
                return Err(ServerError::Multiplex(e));
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                return Ok(());
            }
        };

        if self.slots.len() == self.slots.capacity() {
            drop(stream);
            warn!("Client {} denied, max clients reached", addr);
            return Ok(());
        }

        if let Err(e) = stream.writable().await {
            warn!("Accept failed for {}: {}", addr, e);
            return Ok(());
        }

        match self.slots.bind(stream, addr) {
            Ok(slot) => {
                handler.on_connect(&mut self.slots, slot);
                settle(handler, &mut self.slots);
            }
            Err(stream) => {
                drop(stream);
                warn!("Client {} denied, max clients reached", addr);
            }
        }

        Ok(())
    }
}

/// Waits for the first of: shutdown, a pending connection, readable clients,
/// or the tick deadline
async fn wait<S>(
    listener: &TcpListener,
    slots: &Slots,
    deadline: Instant,
    mut shutdown: Pin<&mut S>,
) -> Wake
where
    S: Future<Output = ()>,
{
    let sleep = sleep_until(deadline);
    tokio::pin!(sleep);

    poll_fn(|cx| {
        if shutdown.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Wake::Shutdown);
        }

        let accepted = match listener.poll_accept(cx) {
            Poll::Ready(result) => Some(result),
            Poll::Pending => None,
        };
        let ready = slots.poll_ready(cx);

        if accepted.is_some() || !ready.is_empty() {
            return Poll::Ready(Wake::Events { accepted, ready });
        }

        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Wake::Timeout),
            Poll::Pending => Poll::Pending,
        }
    })
    .await
}

/// Swaps in a successor handler and delivers queued disconnects
fn settle(handler: &mut Box<dyn Handler>, slots: &mut Slots) {
    loop {
        if let Some(next) = handler.successor() {
            debug!("Handler replaced");
            *handler = next;
            continue;
        }

        match slots.take_closed() {
            Some(slot) => handler.on_disconnect(slots, slot),
            None => break,
        }
    }
}

/// Accept errors that mean the listening socket itself is unusable, as
/// opposed to a single connection failing during its handshake
fn is_listener_failure(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected | io::ErrorKind::Unsupported
    )
}
