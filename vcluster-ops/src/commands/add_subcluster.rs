// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! add_subcluster: create a new (usually secondary) subcluster (Eon).

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsCheckSubclusterOp, HttpsCreateSubclusterOp, HttpsFindSubclusterOp, HttpsGetUpNodesOp,
    SubclusterExpectation,
};

pub struct AddSubclusterOptions {
    pub db: DatabaseOptions,
    pub sc_name: String,
    pub is_primary: bool,
    pub control_set_size: Option<i64>,
}

impl Default for AddSubclusterOptions {
    fn default() -> Self {
        AddSubclusterOptions {
            db: DatabaseOptions::default(),
            sc_name: String::new(),
            is_primary: false,
            control_set_size: None,
        }
    }
}

impl AddSubclusterOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("add_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpsError::validation("add_subcluster requires a subcluster name"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn add_subcluster(
        &self,
        options: &mut AddSubclusterOptions,
    ) -> Result<(), OpsError> {
        options.validate_analyze()?;

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
            Box::new(HttpsFindSubclusterOp::new(
                &self.log,
                vec![],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                SubclusterExpectation::MustNotExist,
            )?),
            Box::new(HttpsCreateSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                options.is_primary,
                options.control_set_size,
            )?),
            Box::new(HttpsCheckSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                options.is_primary,
                options.control_set_size.unwrap_or(-1),
            )?),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }
}
