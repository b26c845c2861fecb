use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ingest::CommunityId;

/// Number of redraws before a colliding color is accepted anyway.
const MAX_REDRAWS: usize = 64;

/// An RGB triple, serialized the way vis.js expects it: `rgb(r,g,b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(String);

impl Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color '{}', expected rgb(r,g,b)", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());

        let inner = s
            .trim()
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;

        let mut channels = inner.split(',').map(|c| c.trim().parse::<u8>());
        let mut next = || channels.next().and_then(Result::ok).ok_or_else(err);
        let color = Color::rgb(next()?, next()?, next()?);

        if channels.next().is_some() {
            return Err(err());
        }

        Ok(color)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Run-scoped mapping from community to color. The first lookup of a
/// community draws a random color, every later lookup returns the same one.
/// Two assignments built from the same seed hand out identical colors for the
/// same sequence of first lookups.
#[derive(Debug, Clone)]
pub struct ColorAssignment {
    rng: StdRng,
    colors: HashMap<CommunityId, Color>,
    used: HashSet<Color>,
}

impl ColorAssignment {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            colors: HashMap::new(),
            used: HashSet::new(),
        }
    }

    pub fn resolve(&mut self, community: &CommunityId) -> Color {
        if let Some(color) = self.colors.get(community) {
            return *color;
        }

        let mut color = self.draw();
        for _ in 0..MAX_REDRAWS {
            if !self.used.contains(&color) {
                break;
            }
            color = self.draw();
        }

        tracing::debug!(%community, %color, "assigned community color");
        self.used.insert(color);
        self.colors.insert(community.clone(), color);
        color
    }

    pub fn get(&self, community: &CommunityId) -> Option<Color> {
        self.colors.get(community).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    fn draw(&mut self) -> Color {
        Color::rgb(
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_text_format() {
        let color = Color::rgb(12, 0, 254);
        assert_eq!(color.to_string(), "rgb(12,0,254)");
        assert_eq!("rgb(12,0,254)".parse::<Color>(), Ok(color));
        assert_eq!(" rgb( 12 , 0 , 254 ) ".parse::<Color>(), Ok(color));

        assert!("rgb(1,2)".parse::<Color>().is_err());
        assert!("rgb(1,2,3,4)".parse::<Color>().is_err());
        assert!("rgb(1,2,256)".parse::<Color>().is_err());
        assert!("#ff0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_serde() {
        let color = Color::rgb(1, 2, 3);
        let json = serde_json::to_string(&color).unwrap();
        assert_eq!(json, "\"rgb(1,2,3)\"");
        assert_eq!(serde_json::from_str::<Color>(&json).unwrap(), color);
    }

    #[test]
    fn test_resolve_is_stable() {
        let mut colors = ColorAssignment::new(7);
        let a = CommunityId::from("1");
        let b = CommunityId::from("2");

        let first = colors.resolve(&a);
        colors.resolve(&b);
        assert_eq!(colors.resolve(&a), first);
        assert_eq!(colors.get(&a), Some(first));
        assert_eq!(colors.len(), 2);
    }

    #[test]
    fn test_distinct_communities_get_distinct_colors() {
        let mut colors = ColorAssignment::new(42);
        let assigned: HashSet<_> = (0..500)
            .map(|i| colors.resolve(&CommunityId(i.to_string())))
            .collect();
        assert_eq!(assigned.len(), 500);
    }

    #[test]
    fn test_same_seed_same_colors() {
        let mut a = ColorAssignment::new(3);
        let mut b = ColorAssignment::new(3);
        for i in 0..10 {
            let community = CommunityId(i.to_string());
            assert_eq!(a.resolve(&community), b.resolve(&community));
        }
    }
}
