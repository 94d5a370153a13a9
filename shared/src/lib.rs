use std::fmt;

/// Hides the terminal cursor.
pub const HIDE_CURSOR: &str = "\x1b[?25l";
/// Clears the whole screen.
pub const CLEAR_SCREEN: &str = "\x1b[2J";
/// Moves the cursor to the top-left corner.
pub const CURSOR_HOME: &str = "\x1b[H";
/// Every frame sent to a client ends with this byte.
pub const FRAME_TERMINATOR: u8 = 0;

/// Each grid cell is drawn two terminal columns wide.
pub const CELL_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Direction {
    #[default]
    None,
    Down,
    Up,
    Right,
    Left,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::None => Direction::None,
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
        }
    }

    /// Two-character glyph drawn on a snake head travelling this way.
    pub fn head_glyph(self) -> &'static str {
        match self {
            Direction::None => "  ",
            Direction::Down => "..",
            Direction::Up => "''",
            Direction::Right => " :",
            Direction::Left => ": ",
        }
    }
}

/// A single keystroke sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Steer(Direction),
}

impl Command {
    /// Decodes one byte; anything that is not a known key yields `None`.
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            b'q' => Some(Command::Quit),
            b'w' => Some(Command::Steer(Direction::Up)),
            b'a' => Some(Command::Steer(Direction::Left)),
            b's' => Some(Command::Steer(Direction::Down)),
            b'd' => Some(Command::Steer(Direction::Right)),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Command::Quit => b'q',
            Command::Steer(Direction::Up) => b'w',
            Command::Steer(Direction::Left) => b'a',
            Command::Steer(Direction::Down) => b's',
            Command::Steer(Direction::Right) => b'd',
            Command::Steer(Direction::None) => b' ',
        }
    }
}

/// Escape sequence that puts the cursor on the given grid cell (zero based).
pub fn cursor_to(column: usize, row: usize) -> String {
    format!("\x1b[{};{}H", row + 1, column * CELL_COLUMNS + 1)
}

/// Growable text buffer one outgoing frame is assembled in.
///
/// Formatted appends go through [`fmt::Write`], so `write!` works directly
/// on the buffer. The buffer is reused between frames with [`FrameBuffer::clear`].
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    text: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The frame as it goes on the wire, terminator included.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(FRAME_TERMINATOR);
        bytes
    }
}

impl fmt::Write for FrameBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

/// Splits complete frames off the front of a receive buffer.
///
/// Returns every terminated frame (without its terminator) and leaves any
/// trailing partial frame in `pending`.
pub fn drain_frames(pending: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while let Some(end) = pending.iter().position(|&b| b == FRAME_TERMINATOR) {
        let frame: Vec<u8> = pending.drain(..=end).take(end).collect();
        frames.push(frame);
    }
    frames
}
