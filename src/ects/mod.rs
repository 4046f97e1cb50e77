// SPDX-License-Identifier: MIT

//! Earnings-call briefing workflow and its service surface

pub mod config;
pub mod envelope;
pub mod prompts;
pub mod server;
pub mod workflow;
