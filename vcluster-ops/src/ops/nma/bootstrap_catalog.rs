// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bootstrap the catalog on the first node of a new database. The
//! request carries the database password and, for communal storage,
//! AWS credentials; both are masked on every log path.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{ClusterOp, OpBase};
use crate::vdb::CoordinationDatabase;
use async_trait::async_trait;
use serde_json::json;
use slog::Logger;

pub struct NmaBootstrapCatalogOp {
    base: OpBase,
    vdb: CoordinationDatabase,
    bootstrap_host: String,
    db_password: Option<String>,
}

impl NmaBootstrapCatalogOp {
    pub fn new(
        log: &Logger,
        vdb: CoordinationDatabase,
        bootstrap_host: &str,
        db_password: Option<&String>,
    ) -> Self {
        NmaBootstrapCatalogOp {
            base: OpBase::new("NMABootstrapCatalogOp", log, vec![bootstrap_host.to_string()]),
            vdb,
            bootstrap_host: bootstrap_host.to_string(),
            db_password: db_password.cloned(),
        }
    }
}

#[async_trait]
impl ClusterOp for NmaBootstrapCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let node = self.vdb.node(&self.bootstrap_host).ok_or_else(|| {
            OpsError::internal(
                self.name(),
                format!("bootstrap host {} is not part of the database", self.bootstrap_host),
            )
        })?;
        let mut body = json!({
            "db_name": self.vdb.name,
            "host": node.address,
            "node_name": node.name,
            "catalog_path": node.catalog_path,
            "data_path": node.storage_locations.first(),
            "depot_path": node.depot_path,
            "num_shards": self.vdb.num_shards,
            "communal_storage_url": self.vdb.communal_storage_location,
            "db_password": self.db_password.clone().unwrap_or_default(),
            "control_addr_family": node.control_address_family,
        });
        if let Some(aws) = &self.vdb.aws_credentials {
            body["aws_access_key_id"] = json!(aws.access_key_id);
            body["aws_secret_access_key"] = json!(aws.secret_access_key);
        }
        let host = self.bootstrap_host.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        self.base.register_request(
            &host,
            HostHttpRequest::nma(Method::POST, "bootstrap-catalog").with_body(body),
        );
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if !result.is_passing() {
                if let Some(err) = &result.err {
                    errors.push(err.clone());
                }
            }
        }
        errors.into_result(name)
    }
}
