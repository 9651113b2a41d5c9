// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! remove_subcluster: drop a whole subcluster and clean its hosts'
//! directories (Eon).

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsDropSubclusterOp, HttpsFindSubclusterOp, HttpsGetUpNodesOp, SubclusterExpectation,
};
use crate::ops::nma::NmaDeleteDirectoriesOp;
use crate::vdb::CoordinationDatabase;

pub struct RemoveSubclusterOptions {
    pub db: DatabaseOptions,
    pub sc_name: String,
    pub force_delete: bool,
}

impl Default for RemoveSubclusterOptions {
    fn default() -> Self {
        RemoveSubclusterOptions {
            db: DatabaseOptions::default(),
            sc_name: String::new(),
            force_delete: false,
        }
    }
}

impl RemoveSubclusterOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("remove_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpsError::validation("remove_subcluster requires a subcluster name"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn remove_subcluster(
        &self,
        options: &mut RemoveSubclusterOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        options.validate_analyze()?;

        let mut vdb = self.vdb_from_running_db(&options.db).await?;
        if let Some(data_prefix) = &options.db.data_prefix {
            vdb.data_prefix = data_prefix.clone();
        }
        if let Some(catalog_prefix) = &options.db.catalog_prefix {
            vdb.catalog_prefix = catalog_prefix.clone();
        }
        vdb.depot_prefix = options.db.depot_prefix.clone();

        let sc_hosts: Vec<String> = vdb
            .nodes()
            .filter(|node| node.subcluster == options.sc_name)
            .map(|node| node.address.clone())
            .collect();
        if sc_hosts.is_empty() {
            return Err(OpsError::precondition(format!(
                "subcluster {} has no nodes in database {}",
                options.sc_name, vdb.name
            )));
        }

        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                &vdb.name,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                None,
            )?),
            Box::new(HttpsFindSubclusterOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                SubclusterExpectation::MustExist,
            )?),
            Box::new(HttpsDropSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
            )?),
            // Last, so a failed drop leaves the files in place.
            Box::new(NmaDeleteDirectoriesOp::new(
                &self.log,
                vdb.copy(&sc_hosts),
                options.force_delete,
            )),
        ];
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        let remaining: Vec<String> = vdb
            .hosts()
            .iter()
            .filter(|host| !sc_hosts.contains(host))
            .cloned()
            .collect();
        vdb.retain_hosts(&remaining);
        vdb.write_cluster_config(options.db.config_directory.as_deref())?;
        Ok(vdb)
    }
}
