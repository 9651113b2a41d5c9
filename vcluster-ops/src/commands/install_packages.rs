// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! install_packages: install the default packages through one up node.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{HttpsGetUpNodesOp, HttpsInstallPackagesOp};

pub struct InstallPackagesOptions {
    pub db: DatabaseOptions,
    /// Reinstall packages that are already installed.
    pub force_reinstall: bool,
}

impl Default for InstallPackagesOptions {
    fn default() -> Self {
        InstallPackagesOptions { db: DatabaseOptions::default(), force_reinstall: false }
    }
}

impl ClusterCommands {
    pub async fn install_packages(
        &self,
        options: &mut InstallPackagesOptions,
    ) -> Result<(), OpsError> {
        options.db.validate_base("install_packages")?;
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
            // No hosts: the op picks an up node from the previous call.
            Box::new(HttpsInstallPackagesOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                options.force_reinstall,
            )?),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }
}
