// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! sandbox_subcluster / unsandbox_subcluster: clone a subcluster into
//! an isolated sandbox sharing communal storage, and bring it back.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    HttpsCheckSubclusterSandboxOp, HttpsGetUpNodesOp, HttpsPollNodeStateOp,
    HttpsSandboxSubclusterOp, SandboxDirection,
};
use crate::ops::DEFAULT_STATE_POLLING_TIMEOUT;
use std::time::Duration;

pub struct SandboxOptions {
    pub db: DatabaseOptions,
    pub sc_name: String,
    pub sandbox_name: String,
    pub state_polling_timeout: Option<Duration>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        SandboxOptions {
            db: DatabaseOptions::default(),
            sc_name: String::new(),
            sandbox_name: String::new(),
            state_polling_timeout: None,
        }
    }
}

impl SandboxOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("sandbox_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpsError::validation("must specify a subcluster name"));
        }
        if self.sandbox_name.is_empty() {
            return Err(OpsError::validation("must specify a sandbox name"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

pub struct UnsandboxOptions {
    pub db: DatabaseOptions,
    pub sc_name: String,
    pub state_polling_timeout: Option<Duration>,
}

impl Default for UnsandboxOptions {
    fn default() -> Self {
        UnsandboxOptions {
            db: DatabaseOptions::default(),
            sc_name: String::new(),
            state_polling_timeout: None,
        }
    }
}

impl UnsandboxOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("unsandbox_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpsError::validation("must specify a subcluster name"));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }
}

impl ClusterCommands {
    /// Sandbox `sc_name` as `sandbox_name`: discover up nodes and the
    /// subcluster's hosts, pick an initiator outside the subcluster and
    /// outside any sandbox, run the sandboxing, then wait for the
    /// sandboxed hosts to come up.
    pub async fn sandbox_subcluster(&self, options: &mut SandboxOptions) -> Result<(), OpsError> {
        options.validate_analyze()?;

        let instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(HttpsGetUpNodesOp::new(
                &self.log,
                options.db.db_name()?,
                options.db.hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                Some(options.sc_name.clone()),
            )?),
            Box::new(HttpsCheckSubclusterSandboxOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                &options.sandbox_name,
            )?),
            Box::new(HttpsSandboxSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                &options.sandbox_name,
                SandboxDirection::Sandbox,
            )?),
            Box::new(HttpsPollNodeStateOp::for_subcluster(
                &self.log,
                &options.sc_name,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            )?),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }

    /// The symmetric operation: move a sandboxed subcluster back into
    /// the main cluster.
    pub async fn unsandbox_subcluster(
        &self,
        options: &mut UnsandboxOptions,
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
                Some(options.sc_name.clone()),
            )?),
            Box::new(HttpsSandboxSubclusterOp::new(
                &self.log,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                &options.sc_name,
                "",
                SandboxDirection::Unsandbox,
            )?),
            Box::new(HttpsPollNodeStateOp::for_subcluster(
                &self.log,
                &options.sc_name,
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            )?),
        ];

        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await
    }
}
