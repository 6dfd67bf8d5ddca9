use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{Result, WorldDataError};

/// Width of the world map in cells; road data is stored row-major.
pub const MAP_WIDTH: usize = 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];
    pub const CARDINALS: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];
    pub const DIAGONALS: [Direction; 4] = [Direction::NE, Direction::SE, Direction::SW, Direction::NW];

    pub fn bit(self) -> u8 {
        match self {
            Direction::N => 0b1000_0000,
            Direction::NE => 0b0100_0000,
            Direction::E => 0b0010_0000,
            Direction::SE => 0b0001_0000,
            Direction::S => 0b0000_1000,
            Direction::SW => 0b0000_0100,
            Direction::W => 0b0000_0010,
            Direction::NW => 0b0000_0001,
        }
    }

    /// The two cardinal directions a diagonal is made of.
    pub fn components(self) -> Option<[Direction; 2]> {
        match self {
            Direction::NE => Some([Direction::N, Direction::E]),
            Direction::SE => Some([Direction::S, Direction::E]),
            Direction::SW => Some([Direction::S, Direction::W]),
            Direction::NW => Some([Direction::N, Direction::W]),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RoadMask(pub u8);

impl RoadMask {
    pub fn has(self, dir: Direction) -> bool {
        self.0 & dir.bit() != 0
    }

    pub fn decode(self) -> BTreeMap<Direction, bool> {
        Direction::ALL.iter().map(|&d| (d, self.has(d))).collect()
    }

    pub fn has_cardinal(self) -> bool {
        Direction::CARDINALS.iter().any(|&d| self.has(d))
    }

    pub fn has_diagonal(self) -> bool {
        Direction::DIAGONALS.iter().any(|&d| self.has(d))
    }

    /// For a cell reached only diagonally, one random cardinal component per
    /// active diagonal, in NE, SE, SW, NW order. Empty if any cardinal road
    /// exists or no diagonal does.
    pub fn diagonal_cardinals<R: Rng + ?Sized>(self, rng: &mut R) -> Vec<Direction> {
        if self.has_cardinal() || !self.has_diagonal() {
            return Vec::new();
        }
        Direction::DIAGONALS
            .iter()
            .filter(|&&d| self.has(d))
            .filter_map(|d| d.components())
            .filter_map(|pair| pair.choose(rng).copied())
            .collect()
    }
}

/// Splits a packed map id into `(x, y)`.
pub fn coords(map_id: u64) -> (usize, usize) {
    ((map_id % 1000) as usize, (map_id / 1000) as usize)
}

#[derive(Debug, Clone)]
pub struct RoadMap {
    data: Vec<u8>,
    width: usize,
}

impl RoadMap {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(WorldDataError::Config(format!(
                "road data not found: {}",
                path.display()
            )));
        }
        Ok(Self::from_bytes(fs::read(path)?, MAP_WIDTH))
    }

    pub fn from_bytes(data: Vec<u8>, width: usize) -> Self {
        Self { data, width }
    }

    pub fn at(&self, x: usize, y: usize) -> Result<RoadMask> {
        let index = x + y * self.width;
        self.data
            .get(index)
            .copied()
            .map(RoadMask)
            .ok_or(WorldDataError::IndexOutOfRange {
                what: "road data",
                index,
                len: self.data.len(),
            })
    }

    pub fn for_map_id(&self, map_id: i64) -> Result<RoadMask> {
        let id = u64::try_from(map_id).map_err(|_| WorldDataError::IndexOutOfRange {
            what: "map id",
            index: map_id.unsigned_abs() as usize,
            len: self.data.len(),
        })?;
        let (x, y) = coords(id);
        self.at(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn north_bit_decodes_alone() {
        let decoded = RoadMask(0b1000_0000).decode();
        assert!(decoded[&Direction::N]);
        assert_eq!(decoded.values().filter(|&&on| on).count(), 1);
    }

    #[test]
    fn full_byte_decodes_every_direction() {
        assert!(RoadMask(0xFF).decode().values().all(|&on| on));
        assert!(RoadMask(0).decode().values().all(|&on| !on));
    }

    #[test]
    fn map_id_splits_into_x_and_y() {
        assert_eq!(coords(123_456), (456, 123));
        assert_eq!(coords(7), (7, 0));
    }

    #[test]
    fn lookup_is_row_major() {
        let mut data = vec![0u8; 3000];
        data[2 * 1000 + 5] = 0x20;
        let map = RoadMap::from_bytes(data, MAP_WIDTH);
        assert_eq!(map.for_map_id(2005).unwrap(), RoadMask(0x20));
        assert!(matches!(
            map.at(0, 3),
            Err(WorldDataError::IndexOutOfRange { index: 3000, .. })
        ));
    }

    #[test]
    fn diagonal_choice_needs_no_cardinal_road() {
        let mut rng = StdRng::seed_from_u64(5);
        let with_cardinal = RoadMask(Direction::N.bit() | Direction::SE.bit());
        assert!(with_cardinal.diagonal_cardinals(&mut rng).is_empty());

        let diagonal_only = RoadMask(Direction::NE.bit() | Direction::SW.bit());
        for _ in 0..20 {
            let picked = diagonal_only.diagonal_cardinals(&mut rng);
            assert_eq!(picked.len(), 2);
            assert!(matches!(picked[0], Direction::N | Direction::E));
            assert!(matches!(picked[1], Direction::S | Direction::W));
        }
    }

    #[test]
    fn missing_road_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = RoadMap::load(&tmp.path().join("roadData.bytes")).unwrap_err();
        assert!(matches!(err, WorldDataError::Config(_)));
    }
}
