//! The 3×3 board: placing marks and evaluating the position.
//!
//! Everything here is pure. A [`Board`] is a small `Copy` value, so
//! [`Board::place`] returns a new board instead of mutating in place; the
//! session keeps whichever board the arbiter accepted.
//!
//! # Wire format
//!
//! A board serializes as a row-major nested array, empty cells as `null`:
//!
//! ```
//! use tictactoe_arbiter::board::{Board, Symbol};
//!
//! let board = Board::new().place(0, 0, Symbol::X).unwrap();
//! let json = serde_json::to_string(&board).unwrap();
//! assert_eq!(json, r#"[["X",null,null],[null,null,null],[null,null,null]]"#);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Number of rows and columns.
pub const SIZE: usize = 3;

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
pub const LINES: [[(usize, usize); 3]; 8] = [
    // Rows
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    // Columns
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    // Diagonals
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// A player's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    /// Held by the first joiner; always moves first.
    X,
    /// Held by the second joiner.
    O,
}

impl Symbol {
    /// Returns the other symbol.
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => write!(f, "X"),
            Symbol::O => write!(f, "O"),
        }
    }
}

/// One square of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Symbol>", into = "Option<Symbol>")]
pub enum Cell {
    #[default]
    Empty,
    Taken(Symbol),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Cell::Empty => None,
            Cell::Taken(symbol) => Some(symbol),
        }
    }
}

impl From<Option<Symbol>> for Cell {
    fn from(symbol: Option<Symbol>) -> Self {
        symbol.map_or(Cell::Empty, Cell::Taken)
    }
}

impl From<Cell> for Option<Symbol> {
    fn from(cell: Cell) -> Self {
        cell.symbol()
    }
}

/// Result of evaluating a board after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Evaluation {
    /// No line is complete and at least one cell is empty.
    Continue,
    /// A line is fully occupied by this symbol.
    Win(Symbol),
    /// All nine cells are filled and no line is complete.
    Draw,
}

impl Evaluation {
    /// Returns `true` for [`Win`](Evaluation::Win) and [`Draw`](Evaluation::Draw).
    pub fn is_final(self) -> bool {
        !matches!(self, Evaluation::Continue)
    }
}

/// Reasons a mark cannot be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlaceError {
    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },

    #[error("cell ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },
}

impl PlaceError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PlaceError::CellOccupied { .. } => ErrorCode::CellOccupied,
            PlaceError::OutOfBounds { .. } => ErrorCode::OutOfBounds,
        }
    }
}

/// A 3×3 grid of [`Cell`]s in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; SIZE]; SIZE],
}

impl Board {
    /// Creates an empty board.
    pub const fn new() -> Self {
        Self {
            cells: [[Cell::Empty; SIZE]; SIZE],
        }
    }

    /// Builds a board from explicit rows.
    pub const fn from_rows(cells: [[Cell; SIZE]; SIZE]) -> Self {
        Self { cells }
    }

    /// Returns the cell at `(row, col)`, or `None` when out of bounds.
    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn rows(&self) -> &[[Cell; SIZE]; SIZE] {
        &self.cells
    }

    /// Returns `true` when no cell is empty.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|cell| !cell.is_empty())
    }

    /// Number of marks on the board.
    pub fn marks(&self) -> usize {
        self.cells.iter().flatten().filter(|c| !c.is_empty()).count()
    }

    /// Returns a copy of this board with `symbol` placed at `(row, col)`.
    ///
    /// # Errors
    ///
    /// [`PlaceError::OutOfBounds`] if either coordinate is not below [`SIZE`],
    /// [`PlaceError::CellOccupied`] if the cell already holds a mark.
    pub fn place(&self, row: usize, col: usize, symbol: Symbol) -> Result<Board, PlaceError> {
        let mut next = *self;
        let cell = next
            .cells
            .get_mut(row)
            .and_then(|r| r.get_mut(col))
            .ok_or(PlaceError::OutOfBounds { row, col })?;
        if !cell.is_empty() {
            return Err(PlaceError::CellOccupied { row, col });
        }
        *cell = Cell::Taken(symbol);
        Ok(next)
    }

    /// Checks all 8 lines for three equal marks, then for a full board.
    pub fn evaluate(&self) -> Evaluation {
        for line in LINES {
            let [a, b, c] = line.map(|(row, col)| self.cell(row, col));
            if let Some(Cell::Taken(symbol)) = a {
                if a == b && a == c {
                    return Evaluation::Win(symbol);
                }
            }
        }

        if self.is_full() {
            Evaluation::Draw
        } else {
            Evaluation::Continue
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for cell in row {
                match cell {
                    Cell::Empty => write!(f, ".")?,
                    Cell::Taken(symbol) => write!(f, "{symbol}")?,
                }
            }
        }
        Ok(())
    }
}
