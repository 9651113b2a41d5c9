// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Concrete operations, grouped by the agent family they talk to, plus
//! the helpers command producers share.

pub mod https;
pub mod nma;

use crate::error::OpsError;
use crate::exec_context::OpEngineExecContext;
use crate::op::ClusterOp;
use crate::vdb::{catalog_root, CoordinationDatabase, NmaDatabase};
use slog::Logger;
use std::collections::BTreeMap;
use std::time::Duration;
use vcluster_common::collections;

/// Interval between polling fan-outs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Overall budget for state polling unless a command overrides it.
pub const DEFAULT_STATE_POLLING_TIMEOUT: Duration = Duration::from_secs(300);
/// Catalog load can legitimately take much longer than node startup.
pub const DEFAULT_LOAD_CATALOG_TIMEOUT: Duration = Duration::from_secs(3600);

/// Below this many alive primary hosts the design k-safety must be 0.
pub const KSAFETY_THRESHOLD: usize = 3;
pub const KSAFE_VALUE_ZERO: u32 = 0;
pub const KSAFE_VALUE_ONE: u32 = 1;

/// Host -> catalog directory, derived from the catalog-editor snapshot.
pub(crate) fn catalog_path_map_from_editor(
    op_name: &str,
    hosts: &[String],
    nma_database: &NmaDatabase,
) -> Result<BTreeMap<String, String>, OpsError> {
    let node_map = nma_database.host_node_map();
    let mut paths = BTreeMap::new();
    for host in hosts {
        let node = node_map.get(host).ok_or_else(|| {
            OpsError::internal(
                op_name,
                format!("host {host} is not part of the catalog snapshot"),
            )
        })?;
        paths.insert(host.clone(), catalog_root(&node.catalog_path).to_string());
    }
    Ok(paths)
}

/// Pick the initiator: the first primary up host not in `exclude`.
pub fn initiator_host(primary_up_hosts: &[String], exclude: &[String]) -> Result<String, OpsError> {
    collections::slice_diff(primary_up_hosts, exclude)
        .into_iter()
        .next()
        .ok_or_else(|| OpsError::precondition("could not find any primary up host to initiate the operation"))
}

/// The node-info view an operation should use: node info refreshed
/// mid-plan wins over the vdb the operation was constructed with.
pub(crate) fn effective_vdb<'a>(
    vdb: &'a CoordinationDatabase,
    ctx: &'a OpEngineExecContext,
) -> &'a CoordinationDatabase {
    ctx.nodes_info.as_ref().unwrap_or(vdb)
}

/// Emit the download/upload pairs that synchronize configuration files
/// from a source host onto the hosts that lack the latest catalog.
///
/// With `source_host = None` the download source and the upload target
/// set are resolved at prepare time from the catalog-editor results;
/// otherwise the upload targets are everything except the source.
pub fn produce_transfer_config_ops(
    instructions: &mut Vec<Box<dyn ClusterOp>>,
    log: &Logger,
    source_host: Option<Vec<String>>,
    target_hosts: Vec<String>,
    vdb: Option<&CoordinationDatabase>,
) {
    for config_type in [nma::ConfigType::Vertica, nma::ConfigType::Spread] {
        instructions.push(Box::new(nma::NmaDownloadConfigOp::new(
            log,
            config_type,
            source_host.clone(),
            vdb.cloned(),
        )));
        instructions.push(Box::new(nma::NmaUploadConfigOp::new(
            log,
            config_type,
            source_host.clone(),
            target_hosts.clone(),
            vdb.cloned(),
            false,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiator_skips_excluded_hosts() {
        let primaries = vec!["h1".to_string(), "h2".to_string(), "h3".to_string()];
        let initiator = initiator_host(&primaries, &["h1".to_string()]).unwrap();
        assert_eq!(initiator, "h2");
    }

    #[test]
    fn initiator_requires_a_candidate() {
        let err = initiator_host(&["h1".to_string()], &["h1".to_string()]).unwrap_err();
        assert!(matches!(err, OpsError::Precondition { .. }));
    }
}
