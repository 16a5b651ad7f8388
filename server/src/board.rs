//! Game-board engine: the cell grid, its entities, and the movement rules.
//!
//! A `Board` is exclusively owned by one session slot and guarded there by a
//! reader/writer lock; nothing in this module synchronizes on its own.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Wall,
    Player,
    Ghost,
}

#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub kind: CellKind,
    pub has_dot: bool,
    pub has_portal: bool,
}

impl Cell {
    pub const fn empty() -> Self {
        Cell {
            kind: CellKind::Empty,
            has_dot: false,
            has_portal: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Maps a wire command byte to a direction. Unknown bytes are ignored by
    /// the caller rather than treated as errors.
    pub fn from_command(command: u8) -> Option<Self> {
        match command.to_ascii_lowercase() {
            b'w' => Some(Direction::Up),
            b's' => Some(Direction::Down),
            b'a' => Some(Direction::Left),
            b'd' => Some(Direction::Right),
            _ => None,
        }
    }

    fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Result of applying one player move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Normal,
    ReachedGoal,
    Died,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub x: usize,
    pub y: usize,
    pub alive: bool,
    pub score: i32,
    /// Scripted move list; empty means the player is driven by PLAY commands.
    pub moves: Vec<Direction>,
    pub current_move: usize,
}

impl Player {
    pub(crate) fn at(x: usize, y: usize) -> Self {
        Player {
            x,
            y,
            alive: true,
            score: 0,
            moves: Vec::new(),
            current_move: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ghost {
    pub x: usize,
    pub y: usize,
    pub moves: Vec<Direction>,
    pub current_move: usize,
}

impl Ghost {
    pub(crate) fn at(x: usize, y: usize) -> Self {
        Ghost {
            x,
            y,
            moves: Vec::new(),
            current_move: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    pub width: usize,
    pub height: usize,
    /// Interval between world ticks, owned by the level.
    pub tempo_ms: u64,
    cells: Vec<Cell>,
    pub players: Vec<Player>,
    pub ghosts: Vec<Ghost>,
}

impl Board {
    pub(crate) fn new(
        width: usize,
        height: usize,
        tempo_ms: u64,
        cells: Vec<Cell>,
        players: Vec<Player>,
        ghosts: Vec<Ghost>,
    ) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Board {
            width,
            height,
            tempo_ms,
            cells,
            players,
            ghosts,
        }
    }

    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.cells[y * self.width + x]
    }

    fn cell_mut(&mut self, x: usize, y: usize) -> &mut Cell {
        &mut self.cells[y * self.width + x]
    }

    fn step(&self, x: usize, y: usize, dir: Direction) -> Option<(usize, usize)> {
        let (dx, dy) = dir.delta();
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < self.width && ny < self.height).then_some((nx, ny))
    }

    /// Applies one move to the given player and classifies the result.
    /// Walls block without consuming the move.
    pub fn move_player(&mut self, index: usize, dir: Direction) -> MoveOutcome {
        let Some(player) = self.players.get(index) else {
            return MoveOutcome::Normal;
        };
        if !player.alive {
            return MoveOutcome::Died;
        }
        let (x, y) = (player.x, player.y);
        let Some((nx, ny)) = self.step(x, y, dir) else {
            return MoveOutcome::Normal;
        };
        match self.cell(nx, ny).kind {
            CellKind::Wall | CellKind::Player => MoveOutcome::Normal,
            CellKind::Ghost => {
                self.cell_mut(x, y).kind = CellKind::Empty;
                self.players[index].alive = false;
                MoveOutcome::Died
            }
            CellKind::Empty => {
                let reached_goal = self.cell(nx, ny).has_portal;
                if self.cell(nx, ny).has_dot {
                    self.cell_mut(nx, ny).has_dot = false;
                    self.players[index].score += 1;
                }
                self.cell_mut(x, y).kind = CellKind::Empty;
                self.cell_mut(nx, ny).kind = CellKind::Player;
                self.players[index].x = nx;
                self.players[index].y = ny;
                if reached_goal {
                    MoveOutcome::ReachedGoal
                } else {
                    MoveOutcome::Normal
                }
            }
        }
    }

    /// Advances a scripted player one step, cycling through its move list.
    /// Returns `None` when the player has no script.
    pub fn advance_player(&mut self, index: usize) -> Option<MoveOutcome> {
        let player = self.players.get_mut(index)?;
        if player.moves.is_empty() {
            return None;
        }
        let dir = player.moves[player.current_move % player.moves.len()];
        player.current_move += 1;
        Some(self.move_player(index, dir))
    }

    /// Moves a ghost one step. Stepping onto the player kills it; dot and
    /// portal flags survive underneath a ghost.
    pub fn move_ghost(&mut self, index: usize, dir: Direction) {
        let Some(ghost) = self.ghosts.get(index) else {
            return;
        };
        let (x, y) = (ghost.x, ghost.y);
        let Some((nx, ny)) = self.step(x, y, dir) else {
            return;
        };
        match self.cell(nx, ny).kind {
            CellKind::Wall | CellKind::Ghost => {}
            CellKind::Player => {
                if let Some(victim) = self
                    .players
                    .iter_mut()
                    .find(|p| p.alive && p.x == nx && p.y == ny)
                {
                    victim.alive = false;
                }
                self.relocate_ghost(index, x, y, nx, ny);
            }
            CellKind::Empty => self.relocate_ghost(index, x, y, nx, ny),
        }
    }

    fn relocate_ghost(&mut self, index: usize, x: usize, y: usize, nx: usize, ny: usize) {
        self.cell_mut(x, y).kind = CellKind::Empty;
        self.cell_mut(nx, ny).kind = CellKind::Ghost;
        self.ghosts[index].x = nx;
        self.ghosts[index].y = ny;
    }

    /// Advances a scripted ghost one step, cycling through its move list.
    pub fn advance_ghost(&mut self, index: usize) {
        let Some(ghost) = self.ghosts.get_mut(index) else {
            return;
        };
        if ghost.moves.is_empty() {
            return;
        }
        let dir = ghost.moves[ghost.current_move % ghost.moves.len()];
        ghost.current_move += 1;
        self.move_ghost(index, dir);
    }

    pub fn player_alive(&self) -> bool {
        self.players.first().is_some_and(|p| p.alive)
    }

    /// True once the board's player has died. A board without a player is
    /// never game-over.
    pub fn is_game_over(&self) -> bool {
        self.players.first().is_some_and(|p| !p.alive)
    }

    pub fn score(&self) -> i32 {
        self.players.first().map_or(0, |p| p.score)
    }

    pub fn player_scripted(&self) -> bool {
        self.players.first().is_some_and(|p| !p.moves.is_empty())
    }

    /// Display-mapped cell grid as sent in a BOARD snapshot.
    pub fn render(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|cell| match cell.kind {
                CellKind::Wall => b'#',
                CellKind::Player => b'C',
                CellKind::Ghost => b'M',
                CellKind::Empty if cell.has_portal => b'@',
                CellKind::Empty if cell.has_dot => b'.',
                CellKind::Empty => b' ',
            })
            .collect()
    }
}
