//! Asset classes handled by the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five asset classes, each with its own sources, transforms,
/// and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Templates,
    Scripts,
    Styles,
    Images,
    Fonts,
}

impl AssetClass {
    /// All classes, in the order the build graph lists them.
    pub const ALL: [AssetClass; 5] = [
        AssetClass::Templates,
        AssetClass::Styles,
        AssetClass::Scripts,
        AssetClass::Images,
        AssetClass::Fonts,
    ];

    /// Stable lowercase name, used in config keys, task ids, and logs.
    pub fn name(self) -> &'static str {
        match self {
            AssetClass::Templates => "templates",
            AssetClass::Scripts => "scripts",
            AssetClass::Styles => "styles",
            AssetClass::Images => "images",
            AssetClass::Fonts => "fonts",
        }
    }

    /// Whether finishing this class's task signals connected browsers.
    pub fn reloads(self) -> bool {
        matches!(self, AssetClass::Templates | AssetClass::Styles | AssetClass::Scripts)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "templates" | "views" => Ok(AssetClass::Templates),
            "scripts" => Ok(AssetClass::Scripts),
            "styles" => Ok(AssetClass::Styles),
            "images" => Ok(AssetClass::Images),
            "fonts" => Ok(AssetClass::Fonts),
            _ => Err(format!("unknown asset class '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_classes() {
        let reloading: Vec<_> = AssetClass::ALL.iter().filter(|c| c.reloads()).collect();
        assert_eq!(reloading.len(), 3);
        assert!(!AssetClass::Images.reloads());
        assert!(!AssetClass::Fonts.reloads());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("styles".parse::<AssetClass>(), Ok(AssetClass::Styles));
        assert_eq!("Views".parse::<AssetClass>(), Ok(AssetClass::Templates));
        assert!("videos".parse::<AssetClass>().is_err());
    }

    #[test]
    fn test_display_matches_name() {
        for class in AssetClass::ALL {
            assert_eq!(class.to_string(), class.name());
        }
    }
}
