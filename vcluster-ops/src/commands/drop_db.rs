// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! drop_db: remove a stopped database's directories and forget it in
//! the config file. Directory deletion runs last so an aborted plan
//! leaves no half-deleted database behind.

use crate::cluster_config::{config_file_path, remove_db_from_config, ClusterConfig};
use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{CheckDbRunningReason, HttpsCheckRunningDbOp};
use crate::ops::nma::{NmaDeleteDirectoriesOp, NmaHealthOp};
use crate::vdb::CoordinationDatabase;
use slog::warn;

pub struct DropDbOptions {
    pub db: DatabaseOptions,
    /// Delete directories even when they hold unexpected content.
    pub force_delete: bool,
}

impl Default for DropDbOptions {
    fn default() -> Self {
        DropDbOptions { db: DatabaseOptions::default(), force_delete: false }
    }
}

impl ClusterCommands {
    pub async fn drop_db(&self, options: &mut DropDbOptions) -> Result<(), OpsError> {
        options.db.validate_base("drop_db")?;
        options.db.analyze()?;
        options.db.set_use_password()?;

        // The config file is the source of truth for a database that is
        // down: it names the hosts and the directories to remove.
        let config_path =
            config_file_path(options.db.db_name()?, options.db.config_directory.as_deref())?;
        let config = ClusterConfig::read(&config_path)?;
        let vdb = CoordinationDatabase::set_from_cluster_config(options.db.db_name()?, &config)?;

        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, vdb.hosts().to_vec())),
            Box::new(HttpsCheckRunningDbOp::new(
                &self.log,
                vdb.hosts().to_vec(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                CheckDbRunningReason::DropDb,
            )?),
            Box::new(NmaDeleteDirectoriesOp::new(&self.log, vdb.clone(), options.force_delete)),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        if let Err(e) =
            remove_db_from_config(&vdb.name, options.db.config_directory.as_deref())
        {
            warn!(self.log, "database dropped but could not be removed from the config file; \
                please clean it up manually"; "error" => %e);
        }
        Ok(())
    }
}
