use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawTopologyFile {
    pub stps: Vec<RawStp>,
}

#[derive(Debug, Deserialize)]
pub struct RawStp {
    pub stp_id: String,
    pub port_id: String,
    /// Comma-separated list of `lo-hi` ranges, e.g. `"1780-1799,1850-1850"`.
    pub vlan_ranges: String,
    pub bandwidth: u32,
    pub topology: Option<String>,
    #[serde(default)]
    pub remote_stp: Option<RawRemoteStp>,
    #[serde(default)]
    pub remote_stp_in: Option<RawRemoteStp>,
    #[serde(default)]
    pub remote_stp_out: Option<RawRemoteStp>,
}

#[derive(Debug, Deserialize)]
pub struct RawRemoteStp {
    pub prefix_urn: String,
    pub id: String,
}
