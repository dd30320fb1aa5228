use std::path::Path;

use tracing::debug;

use crate::error::TopologyError;
use crate::raw::{RawRemoteStp, RawStp, RawTopologyFile};
use crate::stp::Stp;

pub fn load_topology_file(path: &Path) -> Result<Vec<Stp>, TopologyError> {
    let content = std::fs::read_to_string(path).map_err(|e| TopologyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "loading topology file");
    let raw: RawTopologyFile = serde_yaml::from_str(&content).map_err(|e| TopologyError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    raw.stps.into_iter().map(convert_stp).collect()
}

fn convert_stp(raw: RawStp) -> Result<Stp, TopologyError> {
    let vlan_ranges = parse_vlan_ranges(&raw.vlan_ranges)?;

    let (mut alias_in, mut alias_out) = (None, None);
    if let Some(remote) = &raw.remote_stp {
        // Swap: the remote's "out" direction feeds our "in", and vice versa.
        alias_in = Some(format!("{}:{}:out", remote.prefix_urn, remote.id));
        alias_out = Some(format!("{}:{}:in", remote.prefix_urn, remote.id));
    }
    if let Some(remote) = &raw.remote_stp_in {
        alias_in = Some(direct_alias(remote));
    }
    if let Some(remote) = &raw.remote_stp_out {
        alias_out = Some(direct_alias(remote));
    }

    Ok(Stp {
        stp_id: raw.stp_id,
        port_id: raw.port_id,
        vlan_ranges,
        bandwidth_mbps: raw.bandwidth,
        topology: raw.topology,
        is_alias_in: alias_in,
        is_alias_out: alias_out,
    })
}

fn direct_alias(remote: &RawRemoteStp) -> String {
    format!("{}:{}", remote.prefix_urn, remote.id)
}

fn parse_vlan_ranges(s: &str) -> Result<Vec<(u16, u16)>, TopologyError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut pieces = part.splitn(2, '-');
            let lo = pieces.next().unwrap_or("");
            let hi = pieces.next().unwrap_or(lo);
            let lo: u16 = lo.parse().map_err(|_| TopologyError::InvalidVlanRange(s.to_string()))?;
            let hi: u16 = hi.parse().map_err(|_| TopologyError::InvalidVlanRange(s.to_string()))?;
            if lo > hi {
                return Err(TopologyError::InvalidVlanRange(s.to_string()));
            }
            Ok((lo, hi))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_range() {
        assert_eq!(parse_vlan_ranges("1780-1799").unwrap(), vec![(1780, 1799)]);
    }

    #[test]
    fn parses_multiple_ranges() {
        assert_eq!(
            parse_vlan_ranges("1780-1799,1850-1850").unwrap(),
            vec![(1780, 1799), (1850, 1850)]
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_vlan_ranges("1799-1780").is_err());
    }

    #[test]
    fn remote_stp_swaps_in_out() {
        let raw = RawStp {
            stp_id: "urn:ogf:network:example.org:2023:topology:Eth1".to_string(),
            port_id: "Eth1".to_string(),
            vlan_ranges: "1780-1799".to_string(),
            bandwidth: 1000,
            topology: None,
            remote_stp: Some(RawRemoteStp { prefix_urn: "urn:ogf:network:peer.org:2023".to_string(), id: "Eth9".to_string() }),
            remote_stp_in: None,
            remote_stp_out: None,
        };
        let stp = convert_stp(raw).unwrap();
        assert_eq!(stp.is_alias_in.as_deref(), Some("urn:ogf:network:peer.org:2023:Eth9:out"));
        assert_eq!(stp.is_alias_out.as_deref(), Some("urn:ogf:network:peer.org:2023:Eth9:in"));
    }
}
