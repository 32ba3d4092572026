// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a port object. Two ports are the same port iff their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PortId(u64);

impl PortId {
    pub fn next() -> Self {
        PortId(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// An input port of a stage shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Inlet {
    id: PortId,
    name: Arc<str>,
}

impl Inlet {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: PortId::next(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh port with the same name but a new identity.
    pub fn carbon_copy(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl fmt::Display for Inlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// An output port of a stage shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outlet {
    id: PortId,
    name: Arc<str>,
}

impl Outlet {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: PortId::next(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn carbon_copy(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl fmt::Display for Outlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// Position of an inlet inside its stage shape, used by stage logic to address ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InPort(pub usize);

/// Position of an outlet inside its stage shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPort(pub usize);
