//! Terminal renderer producing full and differential frames of the grid

use crate::grid::{Cell, Grid, Position};
use shared::{cursor_to, Direction, FrameBuffer, CLEAR_SCREEN, CURSOR_HOME, HIDE_CURSOR};
use std::fmt::Write;

/// Background colours cycled through by player index (red, green, yellow,
/// blue, magenta, cyan)
const PLAYER_COLORS: usize = 6;

pub fn player_color(player: usize) -> usize {
    41 + player % PLAYER_COLORS
}

/// Builds frames into a reusable buffer
#[derive(Debug, Default)]
pub struct Renderer {
    frame: FrameBuffer,
    draws: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            frame: FrameBuffer::new(),
            draws: 0,
        }
    }

    /// Renders `grid` and returns the finished frame
    ///
    /// A full frame clears the screen and draws every cell, leaving the diff
    /// basis untouched. A differential frame draws only cells that changed
    /// since the last differential frame and then commits the grid, so
    /// rendering again without a simulation step draws nothing.
    pub fn render(&mut self, grid: &mut Grid, full: bool) -> &FrameBuffer {
        self.frame.clear();
        self.draws = 0;

        if full {
            self.frame.push_str(HIDE_CURSOR);
            self.frame.push_str(CLEAR_SCREEN);
        }
        self.frame.push_str(CURSOR_HOME);

        let mut cursor = Position::new(0, 0);
        for pos in grid.positions() {
            if !full && !grid.changed(pos) {
                continue;
            }
            if pos != cursor {
                self.frame.push_str(&cursor_to(pos.x, pos.y));
            }
            draw_cell(&mut self.frame, grid.cell(pos), grid.direction(pos));
            cursor = Position::new(pos.x + 1, pos.y);
            self.draws += 1;
        }

        if !full {
            grid.commit();
        }

        &self.frame
    }

    /// Number of cells drawn in the last frame
    pub fn draws(&self) -> usize {
        self.draws
    }
}

fn draw_cell(frame: &mut FrameBuffer, cell: Cell, direction: Direction) {
    // Writing into a FrameBuffer cannot fail
    let _ = match cell {
        Cell::Empty => write!(frame, "\x1b[0;30;40m  "),
        Cell::Food => write!(frame, "\x1b[1;37;40m<>"),
        Cell::Head(player) => write!(
            frame,
            "\x1b[0;30;{}m{}",
            player_color(player),
            direction.head_glyph()
        ),
        Cell::Body(player) | Cell::Tail(player) => {
            write!(frame, "\x1b[0;30;{}m  ", player_color(player))
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "\x1b[0;30;40m  ";

    #[test]
    fn test_full_frame_of_empty_grid() {
        for (w, h) in [(1, 1), (4, 3), (40, 20)] {
            let mut grid = Grid::new(w, h);
            let mut renderer = Renderer::new();
            let frame = renderer.render(&mut grid, true).as_str().to_string();

            assert!(frame.starts_with("\x1b[?25l\x1b[2J\x1b[H"));
            assert_eq!(frame.matches(EMPTY).count(), w * h);
            assert_eq!(renderer.draws(), w * h);
        }
    }

    #[test]
    fn test_full_frame_ignores_prior_state() {
        let mut grid = Grid::new(5, 5);
        let mut renderer = Renderer::new();
        renderer.render(&mut grid, false);
        renderer.render(&mut grid, false);

        renderer.render(&mut grid, true);
        assert_eq!(renderer.draws(), 25);
    }

    #[test]
    fn test_full_frame_starts_new_rows_with_cursor_move() {
        let mut grid = Grid::new(2, 2);
        let mut renderer = Renderer::new();
        let frame = renderer.render(&mut grid, true).as_str().to_string();

        let expected = format!(
            "\x1b[?25l\x1b[2J\x1b[H{}{}\x1b[2;1H{}{}",
            EMPTY, EMPTY, EMPTY, EMPTY
        );
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_differential_frame_is_idempotent() {
        let mut grid = Grid::new(6, 4);
        let mut renderer = Renderer::new();

        grid.set_cell(Position::new(2, 1), Cell::Food);
        renderer.render(&mut grid, false);
        assert_eq!(renderer.draws(), 1);

        let frame = renderer.render(&mut grid, false).as_str().to_string();
        assert_eq!(renderer.draws(), 0);
        assert_eq!(frame, "\x1b[H");
    }

    #[test]
    fn test_full_frame_does_not_consume_diff() {
        let mut grid = Grid::new(3, 3);
        let mut renderer = Renderer::new();

        grid.set_cell(Position::new(1, 1), Cell::Food);
        renderer.render(&mut grid, true);
        renderer.render(&mut grid, false);
        assert_eq!(renderer.draws(), 1);
    }

    #[test]
    fn test_adjacent_changes_share_cursor_move() {
        let mut grid = Grid::new(5, 3);
        let mut renderer = Renderer::new();

        grid.set_cell(Position::new(1, 2), Cell::Food);
        grid.set_cell(Position::new(2, 2), Cell::Food);
        grid.set_cell(Position::new(4, 2), Cell::Food);

        let frame = renderer.render(&mut grid, false).as_str().to_string();
        let food = "\x1b[1;37;40m<>";
        let expected = format!(
            "\x1b[H\x1b[3;3H{}{}\x1b[3;9H{}",
            food, food, food
        );
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_change_at_origin_needs_no_cursor_move() {
        let mut grid = Grid::new(3, 3);
        let mut renderer = Renderer::new();

        grid.set_cell(Position::new(0, 0), Cell::Food);
        let frame = renderer.render(&mut grid, false).as_str().to_string();
        assert_eq!(frame, "\x1b[H\x1b[1;37;40m<>");
    }

    #[test]
    fn test_snake_glyphs_and_colors() {
        let mut grid = Grid::new(3, 1);
        let mut renderer = Renderer::new();

        grid.set_cell(Position::new(0, 0), Cell::Tail(1));
        grid.set_cell(Position::new(1, 0), Cell::Body(1));
        grid.set_cell(Position::new(2, 0), Cell::Head(1));
        grid.set_direction(Position::new(2, 0), Direction::Right);

        let frame = renderer.render(&mut grid, false).as_str().to_string();
        assert_eq!(
            frame,
            "\x1b[H\x1b[0;30;42m  \x1b[0;30;42m  \x1b[0;30;42m :"
        );
    }

    #[test]
    fn test_player_colors_cycle() {
        assert_eq!(player_color(0), 41);
        assert_eq!(player_color(1), 42);
        assert_eq!(player_color(5), 46);
        assert_eq!(player_color(6), 41);
    }
}
