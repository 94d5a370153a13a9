use crate::daemon::Handler;
use crate::error::{ConnectionError, ServerError, ServerResult};
use crate::grid::{Cell, Grid, Position};
use crate::render::Renderer;
use crate::slots::Slots;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{Command, Direction};

/// Length of a freshly seeded snake
pub const INITIAL_LENGTH: usize = 2;

/// Only the first byte of each read is interpreted
const READ_BUFFER_SIZE: usize = 2048;

/// What happens to a snake's cells once it is dead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeadBodies {
    /// The body stays on the grid as an obstacle and the slot never respawns
    #[default]
    Persist,
    /// The body is removed and the slot respawns on its next connect
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    pub width: usize,
    pub height: usize,
    /// Steps between two food spawn attempts
    pub food_interval: u64,
    pub dead_bodies: DeadBodies,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 20,
            food_interval: 10,
            dead_bodies: DeadBodies::Persist,
        }
    }
}

impl GameConfig {
    pub fn validate(&self, slots: usize) -> ServerResult<()> {
        if self.width == 0 || self.height < INITIAL_LENGTH {
            return Err(ServerError::Config(format!(
                "grid of {}x{} is too small, need at least 1x{}",
                self.width, self.height, INITIAL_LENGTH
            )));
        }
        if self.food_interval == 0 {
            return Err(ServerError::Config(
                "food interval must be at least 1 tick".to_string(),
            ));
        }
        if slots == 0 || slots > self.width {
            return Err(ServerError::Config(format!(
                "{} slots do not fit on a grid {} columns wide",
                slots, self.width
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Player {
    pub alive: bool,
    /// Cells occupied; zero until the player is first seeded
    pub length: usize,
    /// Direction the head takes on the next step
    pub direction: Direction,
    pub head: Position,
    pub tail: Position,
    pub previous_head: Position,
    pub previous_tail: Position,
}

impl Player {
    pub fn is_seeded(&self) -> bool {
        self.length > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Move,
    Grow,
    Die,
}

/// Multiplayer snake on a shared wrap-around grid
///
/// One player per daemon slot. A player's state survives disconnects of its
/// slot; see [`DeadBodies`] for what happens after death.
pub struct SnakeGame {
    config: GameConfig,
    grid: Grid,
    players: Vec<Player>,
    rng: StdRng,
    steps: u64,
    renderer: Renderer,
}

impl SnakeGame {
    pub fn new(config: GameConfig, slots: usize, rng: StdRng) -> ServerResult<Self> {
        config.validate(slots)?;

        Ok(Self {
            config,
            grid: Grid::new(config.width, config.height),
            players: vec![Player::default(); slots],
            rng,
            steps: 0,
            renderer: Renderer::new(),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn player(&self, slot: usize) -> Option<&Player> {
        self.players.get(slot)
    }

    /// Brings a player into the game unless it already has state
    ///
    /// Returns true if the player was seeded by this call.
    pub fn join(&mut self, slot: usize) -> bool {
        match self.players.get(slot) {
            Some(player) if !player.is_seeded() => self.spawn(slot),
            _ => false,
        }
    }

    /// Seeds `slot` at its starting column, heading down
    ///
    /// Fails without touching the grid when either starting cell is taken.
    fn spawn(&mut self, slot: usize) -> bool {
        let x = slot * self.grid.width() / self.players.len();
        let (Ok(head), Ok(tail)) = (self.grid.position(x, 1), self.grid.position(x, 0)) else {
            return false;
        };

        if self.grid.cell(head) != Cell::Empty || self.grid.cell(tail) != Cell::Empty {
            warn!("Player {} cannot spawn at column {}: cells taken", slot, x);
            return false;
        }

        self.players[slot] = Player {
            alive: true,
            length: INITIAL_LENGTH,
            direction: Direction::Down,
            head,
            tail,
            previous_head: head,
            previous_tail: tail,
        };

        self.grid.set_direction(head, Direction::Down);
        self.grid.set_direction(tail, Direction::Down);
        self.grid.set_cell(head, Cell::Head(slot));
        self.grid.set_cell(tail, Cell::Tail(slot));

        info!("Added player {} at ({}, {})", slot, head.x, head.y);
        true
    }

    /// Requests a new heading for the next step
    ///
    /// Rejected when it points straight back along the direction the head
    /// last moved, or when the player has never been seeded.
    pub fn steer(&mut self, slot: usize, direction: Direction) -> bool {
        let Some(player) = self.players.get_mut(slot) else {
            return false;
        };
        if !player.is_seeded() {
            return false;
        }

        let moving = self.grid.direction(player.head);
        if direction == moving.opposite() {
            return false;
        }

        player.direction = direction;
        true
    }

    /// Marks the player dead, applying the dead body policy
    pub fn kill(&mut self, slot: usize) {
        let Some(player) = self.players.get_mut(slot) else {
            return;
        };
        if !player.is_seeded() {
            return;
        }

        player.alive = false;

        if self.config.dead_bodies == DeadBodies::Clear {
            let cleared = self.grid.clear_player(slot);
            self.players[slot] = Player::default();
            debug!("Cleared {} cells of player {}", cleared, slot);
        }
    }

    /// Puts food on `pos` if the cell is empty
    pub fn place_food(&mut self, pos: Position) -> bool {
        if self.grid.cell(pos) != Cell::Empty {
            return false;
        }
        self.grid.set_cell(pos, Cell::Food);
        true
    }

    /// One food spawn attempt on a random cell; no retry if it is taken
    pub fn spawn_food(&mut self) -> Option<Position> {
        let x = self.rng.gen_range(0..self.grid.width());
        let y = self.rng.gen_range(0..self.grid.height());
        let pos = Position::new(x, y);

        self.place_food(pos).then_some(pos)
    }

    /// Advances the simulation by one tick
    pub fn step(&mut self) {
        self.steps += 1;
        self.next_frame();

        if self.steps % self.config.food_interval == 0 {
            match self.spawn_food() {
                Some(pos) => debug!("Food at ({}, {})", pos.x, pos.y),
                None => trace!("Food spawn skipped, cell taken"),
            }
        }
    }

    /// Moves every living snake one cell
    ///
    /// Outcomes are decided against the grid as it stood before anyone
    /// moved: a head entering a snake cell dies, as does a head entering a
    /// cell a lower slot's head already claimed this step. Dying players
    /// leave the grid untouched.
    pub fn next_frame(&mut self) {
        let mut outcomes = vec![None; self.players.len()];
        let mut claimed: Vec<Position> = Vec::new();

        for (slot, player) in self.players.iter_mut().enumerate() {
            if !player.alive {
                continue;
            }

            let tail_direction = self.grid.direction(player.tail);
            player.previous_tail = player.tail;
            player.previous_head = player.head;
            player.tail = self.grid.step(player.tail, tail_direction);
            player.head = self.grid.step(player.head, player.direction);

            let target = self.grid.cell(player.head);
            let outcome = if target.is_snake() || claimed.contains(&player.head) {
                Outcome::Die
            } else if target == Cell::Food {
                Outcome::Grow
            } else {
                Outcome::Move
            };

            if outcome != Outcome::Die {
                claimed.push(player.head);
            }
            outcomes[slot] = Some(outcome);
        }

        // Tails first, so a grown snake keeps its tail in place
        for (slot, outcome) in outcomes.iter().enumerate() {
            let player = &mut self.players[slot];
            match outcome {
                Some(Outcome::Move) => {
                    self.grid.set_direction(player.previous_tail, Direction::None);
                    self.grid.set_cell(player.previous_tail, Cell::Empty);
                    self.grid.set_cell(player.tail, Cell::Tail(slot));
                }
                Some(Outcome::Grow) => {
                    player.length += 1;
                    player.tail = player.previous_tail;
                }
                Some(Outcome::Die) => {
                    player.head = player.previous_head;
                    player.tail = player.previous_tail;
                }
                None => {}
            }
        }

        for (slot, outcome) in outcomes.iter().enumerate() {
            match outcome {
                Some(Outcome::Move | Outcome::Grow) => {
                    let player = self.players[slot];
                    self.grid.set_direction(player.previous_head, player.direction);
                    self.grid.set_direction(player.head, player.direction);
                    if player.length > INITIAL_LENGTH {
                        self.grid.set_cell(player.previous_head, Cell::Body(slot));
                    }
                    self.grid.set_cell(player.head, Cell::Head(slot));
                }
                Some(Outcome::Die) => {
                    info!(
                        "Player {} died at length {}",
                        slot, self.players[slot].length
                    );
                    self.kill(slot);
                }
                None => {}
            }
        }
    }

    /// Full repaint of the current state, terminator included
    pub fn full_frame(&mut self) -> Vec<u8> {
        self.renderer.render(&mut self.grid, true).to_wire()
    }

    /// Cells changed since the last differential frame, terminator included
    pub fn diff_frame(&mut self) -> Vec<u8> {
        self.renderer.render(&mut self.grid, false).to_wire()
    }

    /// Cells drawn by the last frame
    pub fn last_draws(&self) -> usize {
        self.renderer.draws()
    }
}

impl Handler for SnakeGame {
    fn on_connect(&mut self, slots: &mut Slots, slot: usize) {
        if slot >= self.players.len() {
            warn!("Slot {} has no player, dropping connection", slot);
            slots.disconnect(slot);
            return;
        }

        if !self.join(slot) {
            debug!("Player {} rejoined", slot);
        }

        let frame = self.full_frame();
        // A failed write has already disconnected the slot
        let _ = slots.write(slot, &frame);
    }

    fn on_disconnect(&mut self, _slots: &mut Slots, slot: usize) {
        info!("Removed player {}", slot);
        self.kill(slot);
    }

    fn on_data(&mut self, slots: &mut Slots, slot: usize) {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = match slots.read(slot, &mut buf) {
            Ok(n) => n,
            Err(ConnectionError::NotReady { .. }) => return,
            Err(e) => {
                debug!("Input from player {} ended: {}", slot, e);
                return;
            }
        };

        let Some(&byte) = buf[..n].first() else {
            return;
        };

        match Command::from_byte(byte) {
            Some(Command::Quit) => {
                slots.disconnect(slot);
            }
            Some(Command::Steer(direction)) => {
                if !self.steer(slot, direction) {
                    trace!("Player {} cannot turn {:?}", slot, direction);
                }
            }
            None => trace!("Player {} sent unknown key {:#04x}", slot, byte),
        }
    }

    fn on_tick(&mut self, slots: &mut Slots, _tick: u32) {
        self.step();
        let frame = self.diff_frame();
        slots.broadcast(&frame);
    }
}
