// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! show_restore_points: list archived restore points of an Eon
//! database.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{HttpsGetUpNodesOp, HttpsShowRestorePointsOp, RestorePoint};

pub struct ShowRestorePointsOptions {
    pub db: DatabaseOptions,
    /// Restrict the listing to one archive.
    pub archive_name: Option<String>,
}

impl Default for ShowRestorePointsOptions {
    fn default() -> Self {
        ShowRestorePointsOptions { db: DatabaseOptions::default(), archive_name: None }
    }
}

impl ClusterCommands {
    pub async fn show_restore_points(
        &self,
        options: &mut ShowRestorePointsOptions,
    ) -> Result<Vec<RestorePoint>, OpsError> {
        options.db.validate_base("show_restore_points")?;
        options.db.analyze()?;
        options.db.set_use_password()?;

        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                options.db.db_name()?,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                None,
            )?),
            Box::new(HttpsShowRestorePointsOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                options.archive_name.clone(),
            )?),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;
        Ok(engine
            .exec_context()
            .map(|ctx| ctx.restore_points.clone())
            .unwrap_or_default())
    }
}
