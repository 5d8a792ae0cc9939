use std::env;
use std::str::FromStr;

use anyhow::anyhow;

/// How a requested appointment range must relate to a published window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvailabilityMatch {
    /// The appointment must span a published window exactly.
    Exact,
    /// The appointment must lie inside a published window.
    Containment,
}

impl FromStr for AvailabilityMatch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(AvailabilityMatch::Exact),
            "containment" | "contain" => Ok(AvailabilityMatch::Containment),
            other => Err(anyhow!("unknown AVAILABILITY_MATCH: {other}")),
        }
    }
}

/// What happens to booked appointments when their availability window is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowRemovalPolicy {
    Block,
    Cascade,
    Orphan,
}

impl FromStr for WindowRemovalPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(WindowRemovalPolicy::Block),
            "cascade" => Ok(WindowRemovalPolicy::Cascade),
            "orphan" => Ok(WindowRemovalPolicy::Orphan),
            other => Err(anyhow!("unknown WINDOW_REMOVAL_POLICY: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub availability_match: AvailabilityMatch,
    pub window_removal_policy: WindowRemovalPolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let availability_match = match env::var("AVAILABILITY_MATCH") {
            Ok(v) => v.parse()?,
            Err(_) => AvailabilityMatch::Containment,
        };
        let window_removal_policy = match env::var("WINDOW_REMOVAL_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => WindowRemovalPolicy::Block,
        };

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            availability_match,
            window_removal_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_availability_match() {
        assert_eq!("exact".parse::<AvailabilityMatch>().unwrap(), AvailabilityMatch::Exact);
        assert_eq!(
            " Containment ".parse::<AvailabilityMatch>().unwrap(),
            AvailabilityMatch::Containment
        );
        assert!("fuzzy".parse::<AvailabilityMatch>().is_err());
    }

    #[test]
    fn parses_window_removal_policy() {
        assert_eq!("BLOCK".parse::<WindowRemovalPolicy>().unwrap(), WindowRemovalPolicy::Block);
        assert_eq!("cascade".parse::<WindowRemovalPolicy>().unwrap(), WindowRemovalPolicy::Cascade);
        assert_eq!("orphan".parse::<WindowRemovalPolicy>().unwrap(), WindowRemovalPolicy::Orphan);
        assert!("delete".parse::<WindowRemovalPolicy>().is_err());
    }
}
