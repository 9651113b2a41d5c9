// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared leaf utilities for the vcluster operation engine.
//!
//! Nothing in this crate knows about operations, plans, or the catalog;
//! it holds the small pieces everything else leans on: host resolution,
//! set arithmetic over host lists, constant-interval polling, and
//! environment-variable plumbing.

pub mod collections;
pub mod env;
pub mod net;
pub mod poll;
