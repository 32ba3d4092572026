// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // settings + validation
pub mod engine;        // interpreter, fusing, shells and host
pub mod errors;        // error handling
pub mod graph;         // graph description: ports, shapes, modules
pub mod observability;
pub mod stages;        // reference stages
pub mod testkit;       // recording probes for boundaries
pub mod traits;        // stage and boundary contracts
