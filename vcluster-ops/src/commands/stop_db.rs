// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! stop_db: shut a running database down and wait until every node
//! stops answering.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsDrainSubclusterOp, HttpsGetUpNodesOp, HttpsPollNodeStateOp, HttpsShutdownDbOp,
    NodeStateTarget,
};
use crate::ops::nma::NmaHealthOp;
use crate::ops::DEFAULT_STATE_POLLING_TIMEOUT;
use std::time::Duration;

pub struct StopDbOptions {
    pub db: DatabaseOptions,
    /// Seconds to wait for active connections before shutdown (Eon).
    /// `None` skips draining.
    pub drain_seconds: Option<u64>,
    /// Kill sessions instead of waiting for them.
    pub force_kill: bool,
    pub state_polling_timeout: Option<Duration>,
}

impl Default for StopDbOptions {
    fn default() -> Self {
        StopDbOptions {
            db: DatabaseOptions::default(),
            drain_seconds: None,
            force_kill: false,
            state_polling_timeout: None,
        }
    }
}

impl StopDbOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("stop_db")?;
        if self.db.raw_hosts.is_empty() && self.db.hosts.is_empty() {
            return Err(OpsError::validation("stop_db requires at least one host"));
        }
        if self.drain_seconds.is_some() && self.db.communal_storage_location.is_none() {
            return Err(OpsError::validation(
                "draining connections is only available for an Eon database",
            ));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    pub async fn stop_db(&self, options: &mut StopDbOptions) -> Result<(), OpsError> {
        options.validate_analyze()?;

        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, options.db.hosts.clone())),
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                options.db.db_name()?,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                None,
            )?),
        ];

        if let Some(drain_seconds) = options.drain_seconds {
            instructions.push(Box::new(HttpsDrainSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                // Empty subcluster name drains the whole database.
                "",
                drain_seconds,
            )?));
        }

        instructions.push(Box::new(HttpsShutdownDbOp::new(
            &self.log,
            options.db.db_name()?,
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            options.force_kill,
        )?));
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            options.db.hosts.clone(),
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            NodeStateTarget::Down,
        )?));

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }
}
