use serde::Serialize;
use std::fmt;
use std::str::FromStr;

// Resources served by the personnel API backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Personnel,
    Locations,
    Status,
    Beats,
    Assignments,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Personnel,
        Resource::Locations,
        Resource::Status,
        Resource::Beats,
        Resource::Assignments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Personnel => "personnel",
            Resource::Locations => "locations",
            Resource::Status => "status",
            Resource::Beats => "beats",
            Resource::Assignments => "assignments",
        }
    }
}

impl FromStr for Resource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// /health response body
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub healthy_backends: usize,
    pub tracked_windows: usize,
}
