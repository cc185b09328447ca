//! Entry point selectors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which cached entry point a call is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// Template render function.
    Render,
    /// Template lookup function.
    Lookup,
}

impl Selector {
    pub const ALL: [Selector; 2] = [Selector::Render, Selector::Lookup];

    pub fn as_str(self) -> &'static str {
        match self {
            Selector::Render => "render",
            Selector::Lookup => "lookup",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "render" => Ok(Selector::Render),
            "lookup" => Ok(Selector::Lookup),
            other => Err(format!("unknown selector '{other}' (expected 'render' or 'lookup')")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_selectors() {
        assert_eq!("render".parse::<Selector>(), Ok(Selector::Render));
        assert_eq!("lookup".parse::<Selector>(), Ok(Selector::Lookup));
        assert!("clear".parse::<Selector>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for selector in Selector::ALL {
            assert_eq!(selector.to_string().parse::<Selector>(), Ok(selector));
        }
    }
}
