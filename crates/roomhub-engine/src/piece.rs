use rand::Rng;

/// One of the seven tetromino kinds, encoded 1-7 in the order fixed by the
/// wire protocol's board cell encoding. `0` is reserved for an empty cell and
/// is not a valid `Kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    I = 1,
    O = 2,
    T = 3,
    S = 4,
    Z = 5,
    J = 6,
    L = 7,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::I,
        Kind::O,
        Kind::T,
        Kind::S,
        Kind::Z,
        Kind::J,
        Kind::L,
    ];

    /// Uniformly random kind drawn from the simulation's injected RNG.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }

    pub fn cell(&self) -> u8 {
        *self as u8
    }

    /// Base shape matrix in spawn orientation. Rows top-to-bottom.
    fn base(&self) -> Vec<Vec<bool>> {
        match self {
            Kind::I => vec![
                vec![false, false, false, false],
                vec![true, true, true, true],
                vec![false, false, false, false],
                vec![false, false, false, false],
            ],
            Kind::O => vec![vec![true, true], vec![true, true]],
            Kind::T => vec![
                vec![false, true, false],
                vec![true, true, true],
                vec![false, false, false],
            ],
            Kind::S => vec![
                vec![false, true, true],
                vec![true, true, false],
                vec![false, false, false],
            ],
            Kind::Z => vec![
                vec![true, true, false],
                vec![false, true, true],
                vec![false, false, false],
            ],
            Kind::J => vec![
                vec![true, false, false],
                vec![true, true, true],
                vec![false, false, false],
            ],
            Kind::L => vec![
                vec![false, false, true],
                vec![true, true, true],
                vec![false, false, false],
            ],
        }
    }
}

/// Clockwise transpose of a square shape matrix: `shape[r][c]` becomes
/// `out[c][n-1-r]`. The O piece has a single rotation state (2x2, rotation
/// invariant) but is transposed through the same code path harmlessly.
fn rotate_cw(shape: &[Vec<bool>]) -> Vec<Vec<bool>> {
    let n = shape.len();
    let mut out = vec![vec![false; n]; n];
    for r in 0..n {
        for c in 0..n {
            out[c][n - 1 - r] = shape[r][c];
        }
    }
    out
}

/// A piece's orientation, independent of board position: its kind and the
/// current rotated shape matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orientation {
    pub kind: Kind,
    pub shape: Vec<Vec<bool>>,
}

impl Orientation {
    pub fn spawn(kind: Kind) -> Self {
        Self {
            shape: kind.base(),
            kind,
        }
    }

    pub fn rotated(&self) -> Self {
        Self {
            kind: self.kind,
            shape: rotate_cw(&self.shape),
        }
    }

    /// Cells occupied by this shape, as (row, col) offsets from its top-left.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.shape.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, filled)| {
                filled.then_some((r as i32, c as i32))
            })
        })
    }

    pub fn bounding_area(&self) -> usize {
        self.shape.len() * self.shape.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn o_piece_is_rotation_invariant() {
        let spawn = Orientation::spawn(Kind::O);
        let spun = spawn.rotated();
        let mut before: Vec<_> = spawn.cells().collect();
        let mut after: Vec<_> = spun.cells().collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn four_rotations_return_to_original_bounding_area() {
        for kind in Kind::ALL {
            let spawn = Orientation::spawn(kind);
            let area = spawn.bounding_area();
            let mut cur = spawn.clone();
            for _ in 0..4 {
                cur = cur.rotated();
                assert_eq!(cur.bounding_area(), area);
            }
            let mut final_cells: Vec<_> = cur.cells().collect();
            let mut start_cells: Vec<_> = spawn.cells().collect();
            final_cells.sort();
            start_cells.sort();
            assert_eq!(final_cells, start_cells, "kind {:?} did not return to start", kind);
        }
    }

    #[test]
    fn random_kind_is_always_valid() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        for _ in 0..50 {
            let k = Kind::random(&mut rng);
            assert!(Kind::ALL.contains(&k));
        }
    }
}
