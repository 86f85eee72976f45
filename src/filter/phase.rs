//! Pipeline phases.

use std::fmt;
use std::str::FromStr;

/// The stage of the request lifecycle a filter takes part in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Before the routing decision. Where requests get rejected.
    Pre,
    /// Routing itself. A route filter may answer in place of the default router.
    Route,
    /// After the backend responded.
    Post,
    /// Instead of `Post`, when the backend failed.
    Error,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Pre, Phase::Route, Phase::Post, Phase::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pre   => "pre",
            Self::Route => "route",
            Self::Post  => "post",
            Self::Error => "error",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Pre   => 0,
            Self::Route => 1,
            Self::Post  => 2,
            Self::Error => 3,
        }
    }
}

/// Accepts `"routing"` as an alias for `"route"`.
impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre"               => Ok(Self::Pre),
            "route" | "routing" => Ok(Self::Route),
            "post"              => Ok(Self::Post),
            "error"             => Ok(Self::Error),
            _                   => Err(()),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_its_own_display() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>(), Ok(phase));
        }
        assert_eq!("routing".parse::<Phase>(), Ok(Phase::Route));
        assert_eq!("PRE".parse::<Phase>(), Err(()));
    }

    #[test]
    fn indices_are_distinct() {
        let mut seen = [false; 4];
        for phase in Phase::ALL {
            assert!(!seen[phase.index()]);
            seen[phase.index()] = true;
        }
    }
}
