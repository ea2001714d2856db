// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for typedrpc
//!
//! Provides common domain messages, an example service and an in-process
//! client/server environment.

pub mod messages;
pub mod services;

pub use messages::*;
pub use services::{EXAMPLE_SERVICE, TestEnv, example_declarations, example_service};
