// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Upload a configuration file to the hosts that need it.
//!
//! Target selection: with an explicit source host the targets are all
//! destination hosts except the source; otherwise the targets are the
//! hosts lacking the latest catalog, and the operation skips itself
//! when that set is empty.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use crate::ops::catalog_path_map_from_editor;
use crate::ops::nma::download_config::ConfigType;
use crate::ops::nma::spread_security;
use crate::vdb::{catalog_root, CoordinationDatabase};
use async_trait::async_trait;
use serde_json::json;
use slog::{info, Logger};
use std::collections::BTreeMap;
use vcluster_common::collections;

const SPREAD_KEY_MARKER: &str = "# VSpreadKey:";

pub struct NmaUploadConfigOp {
    base: OpBase,
    config_type: ConfigType,
    source_config_host: Option<Vec<String>>,
    dest_hosts: Vec<String>,
    vdb: Option<CoordinationDatabase>,
    /// Attach a freshly generated spread key to the uploaded file. The
    /// key material must never be logged.
    encrypt_spread: bool,
}

impl NmaUploadConfigOp {
    pub fn new(
        log: &Logger,
        config_type: ConfigType,
        source_config_host: Option<Vec<String>>,
        dest_hosts: Vec<String>,
        vdb: Option<CoordinationDatabase>,
        encrypt_spread: bool,
    ) -> Self {
        let name = match config_type {
            ConfigType::Vertica => "NMAUploadVerticaConfigOp",
            ConfigType::Spread => "NMAUploadSpreadConfigOp",
        };
        NmaUploadConfigOp {
            base: OpBase::new(name, log, vec![]),
            config_type,
            source_config_host,
            dest_hosts,
            vdb,
            encrypt_spread,
        }
    }

    fn target_hosts(&mut self, ctx: &OpEngineExecContext) -> Result<Vec<String>, OpsError> {
        if self.vdb.as_ref().is_some_and(|vdb| !vdb.is_empty()) {
            return Ok(self.dest_hosts.clone());
        }
        match &self.source_config_host {
            Some(source) => Ok(collections::slice_diff(&self.dest_hosts, source)),
            None => {
                if ctx.hosts_with_latest_catalog.is_empty() {
                    return Err(OpsError::internal(
                        self.name(),
                        "could not find at least one host with the latest catalog",
                    ));
                }
                Ok(collections::slice_diff(&self.dest_hosts, &ctx.hosts_with_latest_catalog))
            }
        }
    }

    fn catalog_paths(
        &self,
        hosts: &[String],
        ctx: &OpEngineExecContext,
    ) -> Result<BTreeMap<String, String>, OpsError> {
        if let Some(vdb) = self.vdb.as_ref().filter(|vdb| !vdb.is_empty()) {
            let mut paths = BTreeMap::new();
            for host in hosts {
                let node = vdb.node(host).ok_or_else(|| {
                    OpsError::internal(
                        self.name(),
                        format!("target host {host} is not part of the database"),
                    )
                })?;
                paths.insert(host.clone(), catalog_root(node.catalog_path.as_str()).to_string());
            }
            return Ok(paths);
        }
        let nma_database = ctx.nma_database.as_ref().ok_or_else(|| {
            OpsError::internal(self.name(), "no catalog snapshot available to locate config files")
        })?;
        catalog_path_map_from_editor(self.name(), hosts, nma_database)
    }

    /// Replace any existing spread-key payload and append a fresh one.
    fn attach_spread_key(content: &str) -> Result<String, OpsError> {
        let kept: Vec<&str> =
            content.lines().filter(|line| !line.starts_with(SPREAD_KEY_MARKER)).collect();
        let details = spread_security::generate_security_details()?;
        Ok(format!("{}\n{SPREAD_KEY_MARKER} {details}", kept.join("\n")))
    }
}

#[async_trait]
impl ClusterOp for NmaUploadConfigOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let hosts = self.target_hosts(ctx)?;
        if hosts.is_empty() {
            info!(self.base.log, "no hosts require an upload, skipping the operation");
            self.base.skip_execute = true;
            return Ok(());
        }
        let catalog_paths = self.catalog_paths(&hosts, ctx)?;
        let mut content = ctx.conf_file_content.clone().ok_or_else(|| {
            OpsError::internal(self.name(), "no downloaded config content to upload")
        })?;
        if self.encrypt_spread && self.config_type == ConfigType::Spread {
            content = Self::attach_spread_key(&content)?;
        }

        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let body = json!({
                "catalog_path": catalog_paths[host],
                "content": content,
                "config_type": self.config_type.as_str(),
            });
            self.base
                .register_request(host, HostHttpRequest::nma(Method::POST, "config/upload").with_body(body));
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_passing() {
                // The response names the file the agent wrote, e.g.
                // {"destination": ".../vertica.conf"}.
                match parse_map_response(name, &result.host, &result.content) {
                    Ok(response) => {
                        if !response.contains_key("destination") {
                            errors.push(crate::error::HostError::Response {
                                host: result.host.clone(),
                                detail: "response does not contain field \"destination\""
                                    .to_string(),
                            });
                        }
                    }
                    Err(e) => errors.push(e),
                }
            } else if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        errors.into_result(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_spread_key_replaces_previous_payload() {
        let original = "Spread config\n# VSpreadKey: {old: payload}";
        let updated = NmaUploadConfigOp::attach_spread_key(original).unwrap();
        assert_eq!(updated.matches(SPREAD_KEY_MARKER).count(), 1);
        assert!(!updated.contains("old: payload"));
        assert!(updated.starts_with("Spread config\n"));
    }
}
