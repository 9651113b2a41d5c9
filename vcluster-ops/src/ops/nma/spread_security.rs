// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Set or rotate the spread encryption key on the hosts holding the
//! latest catalog (the hosts spread.conf is copied from during start).
//!
//! The generated key material must never be written to a log or error
//! message.

use crate::error::{HostErrors, OpsError};
use crate::exec_context::OpEngineExecContext;
use crate::http_request::{HostHttpRequest, Method};
use crate::op::{parse_map_response, ClusterOp, OpBase};
use crate::ops::catalog_path_map_from_editor;
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use slog::Logger;

/// The only key type currently supported.
pub const SPREAD_KEY_TYPE_VERTICA: &str = "vertica";

const SPREAD_KEY_SIZE: usize = 32;
const KEY_ID_LENGTH: usize = 4;
const KEY_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub struct NmaSpreadSecurityOp {
    base: OpBase,
    key_type: String,
}

impl NmaSpreadSecurityOp {
    pub fn new(log: &Logger, key_type: &str) -> Self {
        NmaSpreadSecurityOp {
            // Hosts are always resolved at prepare time from the
            // catalog-editor results.
            base: OpBase::new("NMASpreadSecurityOp", log, vec![]),
            key_type: key_type.to_string(),
        }
    }
}

/// A fresh `{key_id: key}` payload: 4-character lower-case alphanumeric
/// id, 32-byte key rendered as 64 hex characters.
pub(crate) fn generate_security_details() -> Result<String, OpsError> {
    Ok(format!("{{{}: {}}}", generate_key_id(), generate_spread_key()))
}

pub(crate) fn generate_spread_key() -> String {
    let mut bytes = [0u8; SPREAD_KEY_SIZE];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn generate_key_id() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_ID_LENGTH)
        .map(|_| KEY_ID_CHARS[rng.gen_range(0..KEY_ID_CHARS.len())] as char)
        .collect()
}

#[async_trait]
impl ClusterOp for NmaSpreadSecurityOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        if self.key_type != SPREAD_KEY_TYPE_VERTICA {
            return Err(OpsError::validation(format!(
                "unsupported spread key type {}",
                self.key_type
            )));
        }
        let hosts = ctx.hosts_with_latest_catalog.clone();
        if hosts.is_empty() {
            return Err(OpsError::internal(
                self.name(),
                "no hosts with the latest catalog to receive the spread key",
            ));
        }
        let nma_database = ctx.nma_database.as_ref().ok_or_else(|| {
            OpsError::internal(self.name(), "no catalog snapshot available to locate catalogs")
        })?;
        let catalog_paths = catalog_path_map_from_editor(self.name(), &hosts, nma_database)?;
        let security_details = generate_security_details()?;

        self.base.hosts = hosts.clone();
        ctx.dispatcher.setup(&self.base.hosts);
        for host in &hosts {
            let body = json!({
                "catalog_path": catalog_paths[host],
                "spread_security_details": security_details,
            });
            self.base.register_request(
                host,
                HostHttpRequest::nma(Method::POST, "catalog/spread-security").with_body(body),
            );
        }
        Ok(())
    }

    fn process_result(&mut self, _ctx: &mut OpEngineExecContext) -> Result<(), OpsError> {
        let name = self.name();
        let mut errors = HostErrors::new();
        for result in self.base.results().values() {
            self.log_response(result);
            if result.is_passing() {
                if let Err(e) = parse_map_response(name, &result.host, &result.content) {
                    errors.push(e);
                }
            } else if let Some(err) = &result.err {
                errors.push(err.clone());
            }
        }
        errors.into_result(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_key_is_64_hex_characters() {
        let key = generate_spread_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_id_is_four_lowercase_alphanumerics() {
        for _ in 0..100 {
            let id = generate_key_id();
            assert_eq!(id.len(), 4);
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn security_details_have_payload_shape() {
        let details = generate_security_details().unwrap();
        assert!(details.starts_with('{'));
        assert!(details.ends_with('}'));
        assert!(details.contains(": "));
    }
}
