//! Block name classification.
//!
//! Location documents reference blocks by name (`WALLAA08.ROAD.RMB`,
//! `WALLAA06.FARMAA04.RMB`, `MARKAA00-012.RMB`). Names are classified once
//! into a [`BlockKind`] and rendered back with [`BlockKind::render`].

use std::fmt;

use crate::roads::Direction;

pub const RMB: &str = ".RMB";
pub const WALL: &str = "WALLAA";
pub const MARKET: &str = "MARKAA";
pub const EMPTY: &str = "EMTYAA00";

/// A six-letter family and an optional two-digit variant (`FARMAA` + `10`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    pub prefix: String,
    pub number: Option<u8>,
}

impl BlockRef {
    pub fn new(prefix: &str, number: u8) -> Self {
        Self {
            prefix: prefix.to_string(),
            number: Some(number),
        }
    }

    /// Parses `FARMAA04`-style names. Anything after the first eight
    /// characters is rejected.
    pub fn parse(name: &str) -> Option<Self> {
        if name.len() < 6 || !name.is_char_boundary(6) {
            return None;
        }
        let (prefix, rest) = name.split_at(6);
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let number = match rest.len() {
            0 => None,
            2 => Some(two_digits(rest)?),
            _ => return None,
        };
        Some(Self {
            prefix: prefix.to_string(),
            number,
        })
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(n) => write!(f, "{}{:02}", self.prefix, n),
            None => f.write_str(&self.prefix),
        }
    }
}

fn two_digits(s: &str) -> Option<u8> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BlockKind {
    /// `EMTYAA00.RMB`, an unbuilt cell.
    Empty,
    /// `WALLAA08.RMB`
    Wall { side: u8 },
    /// `WALLAA08.ROAD.RMB`, a wall gate waiting for a road decision.
    WallRoad { side: u8 },
    /// `WALLAA08.FARMAA04.RMB`
    WallCombo { side: u8, inner: BlockRef },
    /// `MARKAA05.RMB`
    Market { number: u8 },
    /// `MARKAA00-012.RMB`
    MarketVariant { base: u8, candidate: u16 },
    /// Any other `XXXXXX##.RMB`.
    Named(BlockRef),
    Other(String),
}

impl BlockKind {
    pub fn classify(name: &str) -> Self {
        let Some(body) = name.strip_suffix(RMB) else {
            return BlockKind::Other(name.to_string());
        };

        if body == EMPTY {
            return BlockKind::Empty;
        }

        let mut parts = body.split('.');
        let head = parts.next().unwrap_or_default();
        let tail = parts.next();
        if parts.next().is_some() {
            return BlockKind::Other(name.to_string());
        }

        if let Some(side) = head.strip_prefix(WALL).and_then(two_digits) {
            return match tail {
                None => BlockKind::Wall { side },
                Some("ROAD") => BlockKind::WallRoad { side },
                Some(inner) => match BlockRef::parse(inner) {
                    Some(inner) => BlockKind::WallCombo { side, inner },
                    None => BlockKind::Other(name.to_string()),
                },
            };
        }
        if tail.is_some() {
            return BlockKind::Other(name.to_string());
        }

        if let Some(rest) = head.strip_prefix(MARKET) {
            if let Some(number) = two_digits(rest) {
                return BlockKind::Market { number };
            }
            if let Some((base, digits)) = rest.split_once('-') {
                let candidate = Some(digits)
                    .filter(|d| d.len() == 3 && d.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|d| d.parse::<u16>().ok());
                if let (Some(base), Some(candidate)) = (two_digits(base), candidate) {
                    return BlockKind::MarketVariant { base, candidate };
                }
            }
            return BlockKind::Other(name.to_string());
        }

        match BlockRef::parse(head) {
            Some(block) if block.number.is_some() => BlockKind::Named(block),
            _ => BlockKind::Other(name.to_string()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            BlockKind::Empty => format!("{EMPTY}{RMB}"),
            BlockKind::Wall { side } => format!("{WALL}{side:02}{RMB}"),
            BlockKind::WallRoad { side } => format!("{WALL}{side:02}.ROAD{RMB}"),
            BlockKind::WallCombo { side, inner } => format!("{WALL}{side:02}.{inner}{RMB}"),
            BlockKind::Market { number } => format!("{MARKET}{number:02}{RMB}"),
            BlockKind::MarketVariant { base, candidate } => {
                format!("{MARKET}{base:02}-{candidate:03}{RMB}")
            }
            BlockKind::Named(block) => format!("{block}{RMB}"),
            BlockKind::Other(raw) => raw.clone(),
        }
    }

    pub fn wall_side(&self) -> Option<u8> {
        match self {
            BlockKind::Wall { side }
            | BlockKind::WallRoad { side }
            | BlockKind::WallCombo { side, .. } => Some(*side),
            _ => None,
        }
    }
}

/// Gate walls 08..=11 face north, east, south and west.
pub fn side_direction(side: u8) -> Option<Direction> {
    match side {
        8 => Some(Direction::N),
        9 => Some(Direction::E),
        10 => Some(Direction::S),
        11 => Some(Direction::W),
        _ => None,
    }
}

pub fn direction_side(dir: Direction) -> Option<u8> {
    match dir {
        Direction::N => Some(8),
        Direction::E => Some(9),
        Direction::S => Some(10),
        Direction::W => Some(11),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_wall_forms() {
        assert_eq!(BlockKind::classify("WALLAA08.RMB"), BlockKind::Wall { side: 8 });
        assert_eq!(BlockKind::classify("WALLAA11.ROAD.RMB"), BlockKind::WallRoad { side: 11 });
        assert_eq!(
            BlockKind::classify("WALLAA06.FARMBA04.RMB"),
            BlockKind::WallCombo {
                side: 6,
                inner: BlockRef::new("FARMBA", 4)
            }
        );
        assert!(matches!(BlockKind::classify("WALLAAxx.RMB"), BlockKind::Other(_)));
    }

    #[test]
    fn classifies_markets() {
        assert_eq!(BlockKind::classify("MARKAA03.RMB"), BlockKind::Market { number: 3 });
        assert_eq!(
            BlockKind::classify("MARKAA00-012.RMB"),
            BlockKind::MarketVariant { base: 0, candidate: 12 }
        );
        assert!(matches!(BlockKind::classify("MARKAA00-12.RMB"), BlockKind::Other(_)));
    }

    #[test]
    fn classifies_plain_blocks() {
        assert_eq!(BlockKind::classify("EMTYAA00.RMB"), BlockKind::Empty);
        assert_eq!(
            BlockKind::classify("FARMAA10.RMB"),
            BlockKind::Named(BlockRef::new("FARMAA", 10))
        );
        assert!(matches!(BlockKind::classify("FARMAA10"), BlockKind::Other(_)));
        assert!(matches!(BlockKind::classify("CUSTOM.RMB"), BlockKind::Other(_)));
    }

    #[test]
    fn render_inverts_classify() {
        for name in [
            "EMTYAA00.RMB",
            "WALLAA09.RMB",
            "WALLAA09.ROAD.RMB",
            "WALLAA10.TVRNAS02.RMB",
            "MARKAA01.RMB",
            "MARKAA01-127.RMB",
            "PAWNAL03.RMB",
            "something odd",
        ] {
            assert_eq!(BlockKind::classify(name).render(), name);
        }
    }

    #[test]
    fn gate_sides_map_to_cardinals() {
        for dir in Direction::CARDINALS {
            let side = direction_side(dir).unwrap();
            assert_eq!(side_direction(side), Some(dir));
        }
        assert_eq!(direction_side(Direction::NE), None);
        assert_eq!(side_direction(6), None);
    }
}
