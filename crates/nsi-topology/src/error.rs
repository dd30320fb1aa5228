use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error in {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("duplicate stp id: {0}")]
    DuplicateStp(String),

    #[error("invalid vlan range '{0}'")]
    InvalidVlanRange(String),

    #[error("dangling alias: {stp_id} aliases unknown stp {target}")]
    DanglingAlias { stp_id: String, target: String },

    #[error("alias cycle detected involving {0}")]
    AliasCycle(String),

    #[error("stp unknown: {0}")]
    StpUnknown(String),
}
