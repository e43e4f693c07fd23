//! Character-grid maze for the simulator.
//!
//! Row 0 of the text is the top (largest Y) of the world; column 0 is the
//! left edge at X = 0. Coordinates are millimetres.

use crate::error::{GatiError, Result};

/// Ray march step (mm)
const RAY_STEP_MM: f32 = 5.0;

#[derive(Clone, Debug)]
pub struct Maze {
    /// `true` = wall, indexed `[row][col]`
    walls: Vec<Vec<bool>>,
    cell_size: f32,
    start: (usize, usize),
}

impl Maze {
    /// Parse rows of `#` (wall), `.` (floor) and one `S` (start).
    pub fn parse<S: AsRef<str>>(rows: &[S], cell_size_mm: f32) -> Result<Self> {
        if rows.is_empty() {
            return Err(GatiError::Config("maze has no rows".to_string()));
        }
        if cell_size_mm.is_nan() || cell_size_mm <= 0.0 {
            return Err(GatiError::Config(format!(
                "maze cell size must be positive, got {}",
                cell_size_mm
            )));
        }

        let width = rows[0].as_ref().chars().count();
        let mut walls = Vec::with_capacity(rows.len());
        let mut start = None;

        for (r, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(GatiError::Config(format!(
                    "maze row {} has {} cells, expected {}",
                    r,
                    row.chars().count(),
                    width
                )));
            }
            let mut cells = Vec::with_capacity(width);
            for (c, ch) in row.chars().enumerate() {
                match ch {
                    '#' => cells.push(true),
                    '.' => cells.push(false),
                    'S' => {
                        if start.replace((r, c)).is_some() {
                            return Err(GatiError::Config("maze has more than one start".to_string()));
                        }
                        cells.push(false);
                    }
                    other => {
                        return Err(GatiError::Config(format!(
                            "unknown maze cell '{}' at row {}, column {}",
                            other, r, c
                        )));
                    }
                }
            }
            walls.push(cells);
        }

        let start = start.ok_or_else(|| GatiError::Config("maze has no start cell".to_string()))?;

        Ok(Self {
            walls,
            cell_size: cell_size_mm,
            start,
        })
    }

    pub fn rows(&self) -> usize {
        self.walls.len()
    }

    pub fn cols(&self) -> usize {
        self.walls[0].len()
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Centre of a cell in world coordinates.
    pub fn cell_center(&self, row: usize, col: usize) -> (f32, f32) {
        let x = (col as f32 + 0.5) * self.cell_size;
        let y = ((self.rows() - 1 - row) as f32 + 0.5) * self.cell_size;
        (x, y)
    }

    pub fn start_position(&self) -> (f32, f32) {
        self.cell_center(self.start.0, self.start.1)
    }

    fn world_to_cell(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let col = (x / self.cell_size).floor();
        let from_bottom = (y / self.cell_size).floor();
        if col < 0.0 || from_bottom < 0.0 {
            return None;
        }
        let (col, from_bottom) = (col as usize, from_bottom as usize);
        if col >= self.cols() || from_bottom >= self.rows() {
            return None;
        }
        Some((self.rows() - 1 - from_bottom, col))
    }

    /// Out of bounds counts as wall.
    pub fn is_wall(&self, x: f32, y: f32) -> bool {
        match self.world_to_cell(x, y) {
            Some((row, col)) => self.walls[row][col],
            None => true,
        }
    }

    /// Distance (mm) from `(ox, oy)` along unit vector `(dx, dy)` to the
    /// first wall, or `None` if nothing lies within `max_range_mm`.
    pub fn ray_cast(&self, ox: f32, oy: f32, dx: f32, dy: f32, max_range_mm: f32) -> Option<f32> {
        if self.is_wall(ox, oy) {
            return Some(0.0);
        }
        let mut distance = 0.0;
        while distance < max_range_mm {
            distance += RAY_STEP_MM;
            if self.is_wall(ox + dx * distance, oy + dy * distance) {
                return Some(distance);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor() -> Maze {
        Maze::parse(&["###", "#.#", "#.#", "#S#", "###"], 400.0).unwrap()
    }

    #[test]
    fn test_parse_and_start() {
        let maze = corridor();
        assert_eq!(maze.rows(), 5);
        assert_eq!(maze.cols(), 3);
        assert_eq!(maze.start_position(), (600.0, 600.0));
    }

    #[test]
    fn test_is_wall() {
        let maze = corridor();
        assert!(!maze.is_wall(600.0, 600.0));
        assert!(maze.is_wall(200.0, 600.0));
        assert!(maze.is_wall(600.0, 1700.0));
        // Outside the grid
        assert!(maze.is_wall(-1.0, 600.0));
        assert!(maze.is_wall(600.0, 5000.0));
    }

    #[test]
    fn test_ray_cast() {
        let maze = corridor();
        // Left wall starts just below x = 400
        assert_eq!(maze.ray_cast(600.0, 600.0, -1.0, 0.0, 2550.0), Some(205.0));
        // Up the corridor to the top wall at y = 1600
        assert_eq!(maze.ray_cast(600.0, 600.0, 0.0, 1.0, 2550.0), Some(1000.0));
        // Short range sees nothing
        assert_eq!(maze.ray_cast(600.0, 600.0, 0.0, 1.0, 500.0), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Maze::parse::<&str>(&[], 400.0).is_err());
        assert!(Maze::parse(&["#.#", "#S"], 400.0).is_err());
        assert!(Maze::parse(&["#x#", "#S#"], 400.0).is_err());
        assert!(Maze::parse(&["#.#", "#.#"], 400.0).is_err());
        assert!(Maze::parse(&["#S#", "#S#"], 400.0).is_err());
    }
}
