//! Waiting room the daemon starts with
//!
//! The lobby builds the game when the first client connects and then hands
//! every client over to it, so the game clock only starts once somebody is
//! watching.

use crate::daemon::Handler;
use crate::slots::Slots;
use log::{debug, info, trace};

/// Builds the handler that replaces the lobby
pub type Start = Box<dyn FnOnce() -> Box<dyn Handler> + Send>;

pub struct Lobby {
    start: Option<Start>,
    ready: Option<Box<dyn Handler>>,
}

impl Lobby {
    pub fn new(start: Start) -> Self {
        Self {
            start: Some(start),
            ready: None,
        }
    }
}

impl Handler for Lobby {
    fn on_connect(&mut self, slots: &mut Slots, slot: usize) {
        let Some(start) = self.start.take() else {
            return;
        };

        match slots.peer_addr(slot) {
            Some(addr) => info!("Starting game for client {} from {}", slot, addr),
            None => info!("Starting game for client {}", slot),
        }

        let mut game = start();
        for occupied in slots.occupied() {
            game.on_connect(slots, occupied);
        }
        self.ready = Some(game);
    }

    fn on_disconnect(&mut self, _slots: &mut Slots, slot: usize) {
        debug!("Client {} left the lobby", slot);
    }

    fn on_data(&mut self, slots: &mut Slots, slot: usize) {
        let mut buf = [0u8; 1024];
        if let Ok(n) = slots.read(slot, &mut buf) {
            if n > 0 {
                debug!("Echoing {} bytes to client {}", n, slot);
                let _ = slots.write(slot, &buf[..n]);
            }
        }
    }

    fn on_tick(&mut self, _slots: &mut Slots, tick: u32) {
        trace!("Lobby tick {}", tick);
    }

    fn successor(&mut self) -> Option<Box<dyn Handler>> {
        self.ready.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Idle;

    impl Handler for Idle {
        fn on_connect(&mut self, _slots: &mut Slots, _slot: usize) {}
        fn on_disconnect(&mut self, _slots: &mut Slots, _slot: usize) {}
        fn on_data(&mut self, _slots: &mut Slots, _slot: usize) {}
        fn on_tick(&mut self, _slots: &mut Slots, _tick: u32) {}
    }

    fn counting_lobby(builds: &Arc<AtomicUsize>) -> Lobby {
        let builds = Arc::clone(builds);
        Lobby::new(Box::new(move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Box::new(Idle) as Box<dyn Handler>
        }))
    }

    #[test]
    fn test_lobby_waits_for_first_connect() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut lobby = counting_lobby(&builds);
        let mut slots = Slots::new(2);

        lobby.on_tick(&mut slots, 0);
        assert!(lobby.successor().is_none());
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lobby_builds_game_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut lobby = counting_lobby(&builds);
        let mut slots = Slots::new(2);

        lobby.on_connect(&mut slots, 0);
        assert!(lobby.successor().is_some());
        assert!(lobby.successor().is_none());

        lobby.on_connect(&mut slots, 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(lobby.successor().is_none());
    }
}
