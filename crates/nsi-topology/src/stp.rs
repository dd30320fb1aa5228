use serde::{Deserialize, Serialize};

/// An STP as loaded from the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stp {
    pub stp_id: String,
    pub port_id: String,
    pub vlan_ranges: Vec<(u16, u16)>,
    pub bandwidth_mbps: u32,
    pub topology: Option<String>,
    pub is_alias_in: Option<String>,
    pub is_alias_out: Option<String>,
}

impl Stp {
    pub fn vlan_in_range(&self, vlan: u16) -> bool {
        self.vlan_ranges.iter().any(|(lo, hi)| vlan >= *lo && vlan <= *hi)
    }

    pub fn bandwidth_available(&self, requested_mbps: u32) -> bool {
        requested_mbps <= self.bandwidth_mbps
    }
}
