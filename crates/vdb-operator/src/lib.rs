/*
 * VerticaDB Operator - Kubernetes Operator for Eon Mode Vertica Clusters
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! VerticaDB operator core library
//!
//! Reconciles a `VerticaDB` custom resource into a running Eon mode
//! database: probes the member pods, starts the management agent, and
//! creates or revives the database through admintools.

pub mod classify;
pub mod cmds;
pub mod config;
pub mod controller;
pub mod crds;
pub mod credentials;
pub mod error;
pub mod events;
pub mod names;
pub mod paths;
pub mod podfacts;
pub mod reconcile;
pub mod test_utils;

pub use config::OperatorConfig;
pub use controller::run_controller;
pub use error::{Error, Result};
