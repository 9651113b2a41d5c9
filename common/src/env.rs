// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variables the library reads when a command opts in.

use thiserror::Error;

pub const VCLUSTER_LOG_PATH: &str = "VCLUSTER_LOG_PATH";
pub const VCLUSTER_KEY_PATH: &str = "VCLUSTER_KEY_PATH";
pub const VCLUSTER_CERT_PATH: &str = "VCLUSTER_CERT_PATH";
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

#[derive(Debug, Error)]
#[error("environment variable {name} is not set")]
pub struct MissingVar {
    pub name: &'static str,
}

/// Read a variable, treating empty values the same as unset.
pub fn var_nonempty(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn require(name: &'static str) -> Result<String, MissingVar> {
    var_nonempty(name).ok_or(MissingVar { name })
}

/// AWS credentials for communal storage access. Both variables must be
/// set; the values are placed in request bodies only and are masked on
/// every log path.
pub fn aws_credentials() -> Result<(String, String), MissingVar> {
    Ok((require(AWS_ACCESS_KEY_ID)?, require(AWS_SECRET_ACCESS_KEY)?))
}
