// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! create_db: bootstrap a new database on empty hosts.

use crate::commands::{ClusterCommands, DatabaseOptions};
use crate::engine::ClusterOpEngine;
use crate::error::OpsError;
use crate::op::ClusterOp;
use crate::ops::https::{
    CheckDbRunningReason, HttpsCheckRunningDbOp, HttpsMarkDesignKSafeOp, HttpsPollNodeStateOp,
    HttpsSyncCatalogOp, NodeStateTarget,
};
use crate::ops::nma::{
    ConfigType, NmaBootstrapCatalogOp, NmaDownloadConfigOp, NmaHealthOp, NmaNetworkProfileOp,
    NmaPrepareDirectoriesOp, NmaStartNodeOp, NmaUploadConfigOp, NmaVerticaVersionOp,
};
use crate::ops::{
    DEFAULT_STATE_POLLING_TIMEOUT, KSAFETY_THRESHOLD, KSAFE_VALUE_ONE, KSAFE_VALUE_ZERO,
};
use crate::vdb::CoordinationDatabase;
use slog::info;
use std::collections::BTreeMap;
use std::time::Duration;
use vcluster_common::collections;

const DEFAULT_EON_SUBCLUSTER: &str = "default_subcluster";

pub struct CreateDbOptions {
    pub db: DatabaseOptions,
    /// Eon shard count; required with a communal storage location.
    pub shard_count: Option<usize>,
    pub depot_size: Option<String>,
    /// Read AWS credentials from the environment for communal storage
    /// bootstrap.
    pub get_aws_credentials_from_env: bool,
    /// Clean non-empty directories instead of failing on them.
    pub force_removal_at_creation: bool,
    /// Attach a spread encryption key to the spread config uploaded to
    /// the non-bootstrap hosts.
    pub spread_encryption: bool,
    pub state_polling_timeout: Option<Duration>,
    pub startup_conf: String,
}

impl Default for CreateDbOptions {
    fn default() -> Self {
        CreateDbOptions {
            db: DatabaseOptions::default(),
            shard_count: None,
            depot_size: None,
            get_aws_credentials_from_env: false,
            force_removal_at_creation: false,
            spread_encryption: false,
            state_polling_timeout: None,
            startup_conf: String::new(),
        }
    }
}

impl CreateDbOptions {
    fn validate_analyze(&mut self) -> Result<(), OpsError> {
        self.db.validate_base("create_db")?;
        if self.db.raw_hosts.is_empty() {
            return Err(OpsError::validation("create_db requires at least one host"));
        }
        if self.db.catalog_prefix.is_none() {
            return Err(OpsError::validation("create_db requires a catalog path"));
        }
        if self.db.data_prefix.is_none() {
            return Err(OpsError::validation("create_db requires a data path"));
        }
        if self.db.communal_storage_location.is_some()
            && self.shard_count.unwrap_or(0) == 0
        {
            return Err(OpsError::validation(
                "an Eon database requires a positive shard count",
            ));
        }
        self.db.analyze()?;
        self.db.set_use_password()
    }

    fn build_vdb(&self) -> Result<CoordinationDatabase, OpsError> {
        let is_eon = self.db.communal_storage_location.is_some();
        let mut vdb = CoordinationDatabase {
            name: self.db.db_name()?.to_string(),
            catalog_prefix: self.db.catalog_prefix.clone().unwrap_or_default(),
            data_prefix: self.db.data_prefix.clone().unwrap_or_default(),
            depot_prefix: self.db.depot_prefix.clone(),
            depot_size: self.depot_size.clone(),
            is_eon,
            communal_storage_location: self.db.communal_storage_location.clone(),
            num_shards: self.shard_count.unwrap_or(0),
            ipv6: self.db.ipv6,
            ..Default::default()
        };
        let subcluster = if is_eon { DEFAULT_EON_SUBCLUSTER } else { "" };
        vdb.add_hosts(&self.db.hosts, subcluster)?;
        if self.get_aws_credentials_from_env {
            vdb.set_aws_credentials_from_env()?;
        }
        Ok(vdb)
    }
}

impl ClusterCommands {
    pub async fn create_db(
        &self,
        options: &mut CreateDbOptions,
    ) -> Result<CoordinationDatabase, OpsError> {
        options.validate_analyze()?;
        let vdb = options.build_vdb()?;

        let instructions = self.produce_create_db_instructions(options, &vdb)?;
        let mut engine = ClusterOpEngine::new(instructions, options.db.certs());
        engine.run(&self.log).await?;

        let path = vdb.write_cluster_config(options.db.config_directory.as_deref())?;
        info!(self.log, "database created"; "db" => &vdb.name, "config" => %path);
        Ok(vdb)
    }

    fn produce_create_db_instructions(
        &self,
        options: &CreateDbOptions,
        vdb: &CoordinationDatabase,
    ) -> Result<Vec<Box<dyn ClusterOp>>, OpsError> {
        let hosts = vdb.hosts().to_vec();
        let bootstrap_host = hosts[0].clone();
        let rest_hosts = collections::slice_diff(&hosts, &[bootstrap_host.clone()]);

        let host_nodes: BTreeMap<_, _> = hosts
            .iter()
            .map(|host| (host.clone(), vdb.node(host).expect("vdb owns its hosts").clone()))
            .collect();

        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
            Box::new(NmaHealthOp::new(&self.log, hosts.clone())),
            Box::new(NmaVerticaVersionOp::new(&self.log, hosts.clone(), true)),
            Box::new(HttpsCheckRunningDbOp::new(
                &self.log,
                hosts.clone(),
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                CheckDbRunningReason::CreateDb,
            )?),
            Box::new(NmaPrepareDirectoriesOp::new(
                &self.log,
                host_nodes,
                options.force_removal_at_creation,
                false,
            )),
            Box::new(NmaNetworkProfileOp::new(&self.log, hosts.clone())),
            Box::new(NmaBootstrapCatalogOp::new(
                &self.log,
                vdb.clone(),
                &bootstrap_host,
                options.db.password.as_ref(),
            )),
        ];

        // The bootstrap host is the only one holding configuration;
        // copy it onto the rest.
        if !rest_hosts.is_empty() {
            for config_type in [ConfigType::Vertica, ConfigType::Spread] {
                instructions.push(Box::new(NmaDownloadConfigOp::new(
                    &self.log,
                    config_type,
                    Some(vec![bootstrap_host.clone()]),
                    Some(vdb.clone()),
                )));
                instructions.push(Box::new(NmaUploadConfigOp::new(
                    &self.log,
                    config_type,
                    Some(vec![bootstrap_host.clone()]),
                    rest_hosts.clone(),
                    Some(vdb.copy(&rest_hosts)),
                    options.spread_encryption && config_type == ConfigType::Spread,
                )));
            }
        }

        instructions.push(Box::new(NmaStartNodeOp::with_vdb(
            &self.log,
            hosts.clone(),
            &options.startup_conf,
            vdb.clone(),
        )));
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            &self.log,
            hosts.clone(),
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            Some(options.state_polling_timeout.unwrap_or(DEFAULT_STATE_POLLING_TIMEOUT)),
            NodeStateTarget::Up,
        )?));

        let ksafe_value =
            if hosts.len() < KSAFETY_THRESHOLD { KSAFE_VALUE_ZERO } else { KSAFE_VALUE_ONE };
        instructions.push(Box::new(HttpsMarkDesignKSafeOp::new(
            &self.log,
            vec![bootstrap_host.clone()],
            options.db.use_password,
            options.db.username_str(),
            options.db.password.as_ref(),
            ksafe_value,
        )?));

        if vdb.is_eon {
            instructions.push(Box::new(HttpsSyncCatalogOp::new(
                &self.log,
                vec![bootstrap_host],
                options.db.use_password,
                options.db.username_str(),
                options.db.password.as_ref(),
                "create_db",
            )?));
        }
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::Logger;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn base_options() -> CreateDbOptions {
        CreateDbOptions {
            db: DatabaseOptions {
                db_name: Some("testdb".to_string()),
                raw_hosts: vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()],
                catalog_prefix: Some("/data".into()),
                data_prefix: Some("/data".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn eon_requires_shard_count() {
        let mut options = base_options();
        options.db.communal_storage_location = Some("s3://bucket/testdb".to_string());
        assert!(options.validate_analyze().is_err());
        options.shard_count = Some(6);
        options.validate_analyze().unwrap();
    }

    #[test]
    fn vdb_is_seeded_from_options() {
        let mut options = base_options();
        options.validate_analyze().unwrap();
        let vdb = options.build_vdb().unwrap();
        assert_eq!(vdb.hosts().len(), 2);
        assert!(!vdb.is_eon);
        assert_eq!(vdb.node("192.0.2.1").unwrap().subcluster, "");
    }

    #[test]
    fn create_db_plan_shape() {
        let mut options = base_options();
        options.validate_analyze().unwrap();
        let vdb = options.build_vdb().unwrap();
        let commands = ClusterCommands::new(&test_logger());
        let instructions =
            commands.produce_create_db_instructions(&options, &vdb).unwrap();
        let names: Vec<&str> = instructions.iter().map(|op| op.name()).collect();
        assert_eq!(
            names,
            vec![
                "NMAHealthOp",
                "NMAVerticaVersionOp",
                "HTTPSCheckRunningDBOp",
                "NMAPrepareDirectoriesOp",
                "NMANetworkProfileOp",
                "NMABootstrapCatalogOp",
                "NMADownloadVerticaConfigOp",
                "NMAUploadVerticaConfigOp",
                "NMADownloadSpreadConfigOp",
                "NMAUploadSpreadConfigOp",
                "NMAStartNodeOp",
                "HTTPSPollNodeStateOp",
                "HTTPSMarkDesignKSafeOp",
            ]
        );
    }
}
