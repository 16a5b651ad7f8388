//! Level files and the ordered catalog the server loads boards from.
//!
//! A level file (`*.lvl`) starts with a header line `width height tempo_ms`,
//! followed by `height` rows of display symbols (`#` wall, `C` player, `M`
//! ghost, `.` dot, `@` portal, space empty), optionally followed by scripted
//! move lines: `moves C dddw` for the player or `moves M<index> wasd` for a
//! ghost. Files are ordered lexicographically by name; that order defines
//! level numbering.

use crate::board::{Board, Cell, CellKind, Direction, Ghost, Player};
use log::debug;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("cannot read level directory {dir}: {source}")]
    Dir {
        dir: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read level file {name}: {source}")]
    File {
        name: String,
        source: std::io::Error,
    },
    #[error("level {name}: {reason}")]
    Parse { name: String, reason: String },
}

/// A directory of level files addressed by index.
#[derive(Debug, Clone)]
pub struct LevelCatalog {
    dir: PathBuf,
}

impl LevelCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All `.lvl` file names in the directory, lexicographically ordered.
    /// The order must be stable across calls since sessions re-list the
    /// directory on every level transition.
    pub fn level_names(&self) -> Result<Vec<String>, LevelError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| LevelError::Dir {
            dir: self.dir.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LevelError::Dir {
                dir: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with('.') && name.ends_with(".lvl") {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads level `index`, seeding the player's score with `carry_score`.
    /// `Ok(None)` means the catalog has no level with that index, which the
    /// caller treats as final victory.
    pub fn load(&self, index: usize, carry_score: i32) -> Result<Option<Board>, LevelError> {
        let names = self.level_names()?;
        let Some(name) = names.get(index) else {
            return Ok(None);
        };
        let text =
            std::fs::read_to_string(self.dir.join(name)).map_err(|source| LevelError::File {
                name: name.clone(),
                source,
            })?;
        let mut board = parse_level(&text).map_err(|reason| LevelError::Parse {
            name: name.clone(),
            reason,
        })?;
        if let Some(player) = board.players.first_mut() {
            player.score = carry_score;
        }
        debug!(
            "loaded level {index} ({name}): {}x{}, tempo {}ms",
            board.width, board.height, board.tempo_ms
        );
        Ok(Some(board))
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str) -> Result<T, String> {
    field
        .ok_or_else(|| format!("missing {name} in header"))?
        .parse()
        .map_err(|_| format!("invalid {name} in header"))
}

fn parse_level(text: &str) -> Result<Board, String> {
    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| "empty level file".to_string())?;
    let mut fields = header.split_whitespace();
    let width: usize = parse_field(fields.next(), "width")?;
    let height: usize = parse_field(fields.next(), "height")?;
    let tempo_ms: u64 = parse_field(fields.next(), "tempo")?;
    if width == 0 || height == 0 {
        return Err("board dimensions must be positive".to_string());
    }

    let mut cells = Vec::with_capacity(width * height);
    let mut players = Vec::new();
    let mut ghosts = Vec::new();
    for y in 0..height {
        let row = lines
            .next()
            .ok_or_else(|| format!("expected {height} grid rows, found {y}"))?;
        let mut symbols: Vec<char> = row.chars().collect();
        if symbols.len() > width {
            return Err(format!("row {y} is wider than {width} cells"));
        }
        symbols.resize(width, ' ');
        for (x, symbol) in symbols.into_iter().enumerate() {
            let mut cell = Cell::empty();
            match symbol {
                '#' => cell.kind = CellKind::Wall,
                'C' => {
                    cell.kind = CellKind::Player;
                    players.push(Player::at(x, y));
                }
                'M' => {
                    cell.kind = CellKind::Ghost;
                    ghosts.push(Ghost::at(x, y));
                }
                '.' => cell.has_dot = true,
                '@' => cell.has_portal = true,
                ' ' => {}
                other => return Err(format!("row {y}: unknown symbol {other:?}")),
            }
            cells.push(cell);
        }
    }

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        if fields.next() != Some("moves") {
            return Err(format!("unexpected line {line:?}"));
        }
        let target = fields
            .next()
            .ok_or_else(|| "moves line missing a target".to_string())?;
        let script = fields
            .next()
            .ok_or_else(|| "moves line missing a script".to_string())?;
        let dirs = script
            .bytes()
            .map(Direction::from_command)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| format!("invalid direction in script {script:?}"))?;
        if target == "C" {
            let player = players
                .first_mut()
                .ok_or_else(|| "moves C but no player on the grid".to_string())?;
            player.moves = dirs;
        } else if let Some(index) = target.strip_prefix('M') {
            let index: usize = index
                .parse()
                .map_err(|_| format!("invalid ghost target {target:?}"))?;
            let ghost = ghosts
                .get_mut(index)
                .ok_or_else(|| format!("no ghost {index} on the grid"))?;
            ghost.moves = dirs;
        } else {
            return Err(format!("unknown moves target {target:?}"));
        }
    }

    Ok(Board::new(width, height, tempo_ms, cells, players, ghosts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::MoveOutcome;
    use std::fs;
    use tempfile::TempDir;

    const LEVEL: &str = "\
5 3 250
#####
#C.@#
#####
";

    const SCRIPTED: &str = "\
7 3 100
#######
#C...@#
#######
moves C dd
";

    fn catalog_with(files: &[(&str, &str)]) -> (TempDir, LevelCatalog) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            fs::write(dir.path().join(name), text).unwrap();
        }
        let catalog = LevelCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_level_names_sorted_and_filtered() {
        let (_dir, catalog) = catalog_with(&[
            ("b.lvl", LEVEL),
            ("a.lvl", LEVEL),
            ("notes.txt", "ignored"),
            (".hidden.lvl", LEVEL),
        ]);

        assert_eq!(catalog.level_names().unwrap(), vec!["a.lvl", "b.lvl"]);
    }

    #[test]
    fn test_load_parses_grid_and_entities() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", LEVEL)]);
        let board = catalog.load(0, 0).unwrap().unwrap();

        assert_eq!(board.width, 5);
        assert_eq!(board.height, 3);
        assert_eq!(board.tempo_ms, 250);
        assert_eq!(board.players.len(), 1);
        assert_eq!((board.players[0].x, board.players[0].y), (1, 1));
        assert!(board.cell(2, 1).has_dot);
        assert!(board.cell(3, 1).has_portal);
    }

    #[test]
    fn test_load_past_end_is_none() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", LEVEL)]);
        assert!(catalog.load(1, 0).unwrap().is_none());
    }

    #[test]
    fn test_load_carries_score() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", LEVEL)]);
        let board = catalog.load(0, 17).unwrap().unwrap();
        assert_eq!(board.score(), 17);
    }

    #[test]
    fn test_missing_directory_errors() {
        let catalog = LevelCatalog::new("/nonexistent/levels");
        assert!(matches!(
            catalog.level_names(),
            Err(LevelError::Dir { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", "5 x 250\n#####\n")]);
        assert!(matches!(catalog.load(0, 0), Err(LevelError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_missing_rows() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", "5 3 250\n#####\n")]);
        assert!(matches!(catalog.load(0, 0), Err(LevelError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_symbol() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", "3 1 250\n#?#\n")]);
        assert!(matches!(catalog.load(0, 0), Err(LevelError::Parse { .. })));
    }

    #[test]
    fn test_scripted_moves_attach_to_player() {
        let (_dir, catalog) = catalog_with(&[("a.lvl", SCRIPTED)]);
        let mut board = catalog.load(0, 0).unwrap().unwrap();
        assert!(board.player_scripted());
        assert_eq!(board.players[0].moves.len(), 2);

        // the two-step script cycles until the portal at (5,1) is reached
        assert_eq!(board.advance_player(0), Some(MoveOutcome::Normal));
        assert_eq!(board.advance_player(0), Some(MoveOutcome::Normal));
        assert_eq!(board.advance_player(0), Some(MoveOutcome::Normal));
        assert_eq!(board.advance_player(0), Some(MoveOutcome::ReachedGoal));
    }

    #[test]
    fn test_moves_for_unknown_ghost_errors() {
        let text = "5 3 250\n#####\n#C.@#\n#####\nmoves M0 dd\n";
        let (_dir, catalog) = catalog_with(&[("a.lvl", text)]);
        assert!(matches!(catalog.load(0, 0), Err(LevelError::Parse { .. })));
    }
}
