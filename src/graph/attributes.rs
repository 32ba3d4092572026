// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;

/// A single annotation on a stage or module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Human-readable name used in logs and snapshots.
    Name(String),
    /// Forces the annotated module into its own island.
    AsyncBoundary,
    /// Execution context the island should be hosted on.
    Dispatcher(String),
    /// Input buffer sizing for boundary inputs of the island.
    InputBuffer { initial: usize, max: usize },
}

/// Ordered list of attributes. Later entries override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    list: Vec<Attribute>,
}

impl Attributes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            list: vec![Attribute::Name(name.into())],
        }
    }

    pub fn async_boundary() -> Self {
        Self {
            list: vec![Attribute::AsyncBoundary],
        }
    }

    pub fn dispatcher(name: impl Into<String>) -> Self {
        Self {
            list: vec![Attribute::Dispatcher(name.into())],
        }
    }

    pub fn input_buffer(initial: usize, max: usize) -> Self {
        Self {
            list: vec![Attribute::InputBuffer { initial, max }],
        }
    }

    /// Concatenate; entries of `other` take precedence.
    pub fn and(mut self, other: Attributes) -> Self {
        self.list.extend(other.list);
        self
    }

    pub fn list(&self) -> &[Attribute] {
        &self.list
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.list.contains(attribute)
    }

    pub fn is_async(&self) -> bool {
        self.contains(&Attribute::AsyncBoundary)
    }

    pub fn name(&self) -> Option<&str> {
        self.list.iter().rev().find_map(|a| match a {
            Attribute::Name(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.name().unwrap_or(default)
    }

    pub fn dispatcher_name(&self) -> Option<&str> {
        self.list.iter().rev().find_map(|a| match a {
            Attribute::Dispatcher(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn input_buffer_bounds(&self) -> Option<(usize, usize)> {
        self.list.iter().rev().find_map(|a| match a {
            Attribute::InputBuffer { initial, max } => Some((*initial, *max)),
            _ => None,
        })
    }
}
