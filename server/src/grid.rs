//! Cell planes of the shared playing field
//!
//! The grid keeps three planes of `width * height` cells:
//! - `current`: what occupies each cell now
//! - `previous`: what each cell held when the last differential frame was
//!   rendered, the basis for the next diff
//! - `directions`: the direction a snake last moved through each cell
//!
//! Coordinates wrap around at every edge, so stepping never leaves the grid.

use crate::error::BoundsError;
use shared::Direction;

/// Contents of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Food,
    Head(usize),
    Body(usize),
    Tail(usize),
}

impl Cell {
    /// True for any part of any snake
    pub fn is_snake(self) -> bool {
        matches!(self, Cell::Head(_) | Cell::Body(_) | Cell::Tail(_))
    }

    /// Player owning this cell, if it is part of a snake
    pub fn owner(self) -> Option<usize> {
        match self {
            Cell::Head(player) | Cell::Body(player) | Cell::Tail(player) => Some(player),
            Cell::Empty | Cell::Food => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    current: Vec<Cell>,
    previous: Vec<Cell>,
    directions: Vec<Direction>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            current: vec![Cell::Empty; size],
            previous: vec![Cell::Empty; size],
            directions: vec![Direction::None; size],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Checked construction of a position on this grid
    pub fn position(&self, x: usize, y: usize) -> Result<Position, BoundsError> {
        let pos = Position::new(x, y);
        if self.contains(pos) {
            Ok(pos)
        } else {
            Err(self.bounds_error(pos))
        }
    }

    fn bounds_error(&self, pos: Position) -> BoundsError {
        BoundsError {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Panics if `pos` is off the grid: every position in use comes from
    /// `position` or `step`, so a miss is a broken coordinate invariant.
    fn index(&self, pos: Position) -> usize {
        assert!(self.contains(pos), "{}", self.bounds_error(pos));
        pos.y * self.width + pos.x
    }

    pub fn cell(&self, pos: Position) -> Cell {
        self.current[self.index(pos)]
    }

    pub fn set_cell(&mut self, pos: Position, cell: Cell) {
        let i = self.index(pos);
        self.current[i] = cell;
    }

    pub fn direction(&self, pos: Position) -> Direction {
        self.directions[self.index(pos)]
    }

    pub fn set_direction(&mut self, pos: Position, direction: Direction) {
        let i = self.index(pos);
        self.directions[i] = direction;
    }

    /// Neighbouring position one cell away, wrapping at the edges
    pub fn step(&self, pos: Position, direction: Direction) -> Position {
        let (w, h) = (self.width, self.height);
        match direction {
            Direction::None => pos,
            Direction::Down => Position::new(pos.x, (pos.y + 1) % h),
            Direction::Up => Position::new(pos.x, (pos.y + h - 1) % h),
            Direction::Right => Position::new((pos.x + 1) % w, pos.y),
            Direction::Left => Position::new((pos.x + w - 1) % w, pos.y),
        }
    }

    /// True if the cell changed since the last commit
    pub fn changed(&self, pos: Position) -> bool {
        let i = self.index(pos);
        self.current[i] != self.previous[i]
    }

    /// Makes the current plane the basis for the next diff
    pub fn commit(&mut self) {
        self.previous.copy_from_slice(&self.current);
    }

    /// Empties every cell belonging to `player`, returning how many
    pub fn clear_player(&mut self, player: usize) -> usize {
        let mut cleared = 0;
        for (cell, direction) in self.current.iter_mut().zip(self.directions.iter_mut()) {
            if cell.owner() == Some(player) {
                *cell = Cell::Empty;
                *direction = Direction::None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Number of cells owned by `player`
    pub fn count_player(&self, player: usize) -> usize {
        self.current
            .iter()
            .filter(|cell| cell.owner() == Some(player))
            .count()
    }

    /// Number of cells holding exactly `cell`
    pub fn count(&self, cell: Cell) -> usize {
        self.current.iter().filter(|&&c| c == cell).count()
    }

    /// All positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Position::new(x, y)))
    }
}
