use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A point in a named world, with optional facing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    pub fn new(world: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.to_string(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Squared distance, `None` when the points are in different worlds
    pub fn distance_squared(&self, other: &Location) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dx * dx + dy * dy + dz * dz)
    }

    /// Whether `other` is strictly closer than `range`
    pub fn within(&self, other: &Location, range: f64) -> bool {
        self.distance_squared(other)
            .is_some_and(|d2| d2 < range * range)
    }

    pub fn block(&self) -> BlockPos {
        BlockPos {
            world: self.world.clone(),
            x: self.x.floor() as i64,
            y: self.y.floor() as i64,
            z: self.z.floor() as i64,
        }
    }
}

impl FromStr for Location {
    type Err = &'static str;

    /// `x;y;z;world[;yaw;pitch]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(';').collect();
        if parts.len() != 4 && parts.len() != 6 {
            return Err("expected x;y;z;world[;yaw;pitch]");
        }
        let coord = |raw: &str| -> Result<f64, &'static str> {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or("coordinates must be numbers")
        };
        let world = parts[3];
        if world.is_empty() {
            return Err("world name is empty");
        }

        let mut location = Location::new(world, coord(parts[0])?, coord(parts[1])?, coord(parts[2])?);
        if parts.len() == 6 {
            let yaw = parts[4].parse::<f32>().map_err(|_| "yaw must be a number")?;
            let pitch = parts[5].parse::<f32>().map_err(|_| "pitch must be a number")?;
            location = location.with_facing(yaw, pitch);
        }
        Ok(location)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.x, self.y, self.z, self.world)
    }
}

/// Integer block coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: String,
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_facing() {
        let loc: Location = "1.5;64;-3;world".parse().unwrap();
        assert_eq!(loc, Location::new("world", 1.5, 64.0, -3.0));

        let loc: Location = "0;0;0;nether;90;-45".parse().unwrap();
        assert_eq!(loc.yaw, 90.0);
        assert_eq!(loc.pitch, -45.0);

        assert!("1;2;3".parse::<Location>().is_err());
        assert!("a;2;3;world".parse::<Location>().is_err());
        assert!("1;2;3;".parse::<Location>().is_err());
    }

    #[test]
    fn test_range_checks() {
        let target = Location::new("world", 0.0, 64.0, 0.0);
        assert!(target.within(&Location::new("world", 2.9, 64.0, 0.0), 3.0));
        assert!(!target.within(&Location::new("world", 3.0, 64.0, 0.0), 3.0));
        assert!(!target.within(&Location::new("nether", 0.0, 64.0, 0.0), 3.0));
    }

    #[test]
    fn test_block_floors_negative_coordinates() {
        let pos = Location::new("world", -0.5, 64.2, 3.9).block();
        assert_eq!((pos.x, pos.y, pos.z), (-1, 64, 3));
    }
}
