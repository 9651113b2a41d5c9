// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operations against the Node Management Agent (plain HTTP).

mod bootstrap_catalog;
mod delete_directories;
mod download_config;
mod get_nodes_info;
mod health;
mod network_profile;
mod prepare_directories;
mod read_catalog_editor;
mod spread_security;
mod start_node;
mod upload_config;
mod vertica_version;

pub use bootstrap_catalog::NmaBootstrapCatalogOp;
pub use delete_directories::NmaDeleteDirectoriesOp;
pub use download_config::{ConfigType, NmaDownloadConfigOp};
pub use get_nodes_info::NmaGetNodesInfoOp;
pub use health::NmaHealthOp;
pub use network_profile::NmaNetworkProfileOp;
pub use prepare_directories::NmaPrepareDirectoriesOp;
pub use read_catalog_editor::NmaReadCatalogEditorOp;
pub use spread_security::NmaSpreadSecurityOp;
pub use start_node::NmaStartNodeOp;
pub use upload_config::NmaUploadConfigOp;
pub use vertica_version::NmaVerticaVersionOp;
