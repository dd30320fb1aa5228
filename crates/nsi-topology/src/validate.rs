use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::TopologyError;
use crate::stp::Stp;

/// Validate a loaded set of STPs:
/// 1. No duplicate `stp_id`.
/// 2. VLAN ranges are well formed (already enforced at parse time).
/// 3. No cycle in the intra-domain alias graph (an alias edge exists only
///    when the alias string names another STP known in this same file —
///    aliases pointing at a different domain's prefix are inter-domain
///    references and are not checked here.
pub fn validate(stps: &[Stp]) -> Result<(), TopologyError> {
    let mut seen = HashSet::new();
    for stp in stps {
        if !seen.insert(stp.stp_id.as_str()) {
            return Err(TopologyError::DuplicateStp(stp.stp_id.clone()));
        }
    }

    let by_id: HashMap<&str, &Stp> = stps.iter().map(|s| (s.stp_id.as_str(), s)).collect();

    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for stp in stps {
        let idx = graph.add_node(stp.stp_id.as_str());
        nodes.insert(stp.stp_id.as_str(), idx);
    }

    for stp in stps {
        for alias in [&stp.is_alias_in, &stp.is_alias_out].into_iter().flatten() {
            if let Some(target) = by_id.get(alias.as_str()) {
                let from = nodes[stp.stp_id.as_str()];
                let to = nodes[target.stp_id.as_str()];
                graph.add_edge(from, to, ());
            }
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(TopologyError::AliasCycle(
            stps.first().map(|s| s.stp_id.clone()).unwrap_or_default(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stp(id: &str, alias_in: Option<&str>) -> Stp {
        Stp {
            stp_id: id.to_string(),
            port_id: id.to_string(),
            vlan_ranges: vec![(1780, 1799)],
            bandwidth_mbps: 1000,
            topology: None,
            is_alias_in: alias_in.map(String::from),
            is_alias_out: None,
        }
    }

    #[test]
    fn rejects_duplicate_stp_id() {
        let stps = vec![stp("a", None), stp("a", None)];
        assert!(matches!(validate(&stps), Err(TopologyError::DuplicateStp(_))));
    }

    #[test]
    fn accepts_acyclic_aliases() {
        let stps = vec![stp("a", Some("b")), stp("b", None)];
        assert!(validate(&stps).is_ok());
    }

    #[test]
    fn rejects_alias_cycle() {
        let stps = vec![stp("a", Some("b")), stp("b", Some("a"))];
        assert!(matches!(validate(&stps), Err(TopologyError::AliasCycle(_))));
    }

    #[test]
    fn ignores_inter_domain_alias() {
        let stps = vec![stp("a", Some("urn:ogf:network:peer.org:2023:Eth9:out"))];
        assert!(validate(&stps).is_ok());
    }
}
