// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ConfigurationError;
use crate::graph::ModuleId;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value produced by materializing a graph.
#[derive(Clone, Default)]
pub enum MatValue {
    #[default]
    NotUsed,
    Value(Arc<dyn Any + Send + Sync>),
    Pair(Box<MatValue>, Box<MatValue>),
}

impl MatValue {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        MatValue::Value(Arc::new(value))
    }

    pub fn pair(left: MatValue, right: MatValue) -> Self {
        MatValue::Pair(Box::new(left), Box::new(right))
    }

    pub fn is_not_used(&self) -> bool {
        matches!(self, MatValue::NotUsed)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            MatValue::Value(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn left(&self) -> Option<&MatValue> {
        match self {
            MatValue::Pair(left, _) => Some(left),
            _ => None,
        }
    }

    pub fn right(&self) -> Option<&MatValue> {
        match self {
            MatValue::Pair(_, right) => Some(right),
            _ => None,
        }
    }
}

impl fmt::Debug for MatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatValue::NotUsed => write!(f, "NotUsed"),
            MatValue::Value(_) => write!(f, "Value(..)"),
            MatValue::Pair(l, r) => write!(f, "Pair({:?}, {:?})", l, r),
        }
    }
}

/// How two materialized values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatCombine {
    KeepLeft,
    KeepRight,
    KeepBoth,
    KeepNone,
}

impl MatCombine {
    pub fn apply(self, left: MatValue, right: MatValue) -> MatValue {
        match self {
            MatCombine::KeepLeft => left,
            MatCombine::KeepRight => right,
            MatCombine::KeepBoth => MatValue::pair(left, right),
            MatCombine::KeepNone => MatValue::NotUsed,
        }
    }
}

/// A named function applied to a materialized value.
#[derive(Clone)]
pub struct MatTransform {
    name: Arc<str>,
    f: Arc<dyn Fn(MatValue) -> MatValue + Send + Sync>,
}

impl MatTransform {
    pub fn new(
        name: impl Into<Arc<str>>,
        f: impl Fn(MatValue) -> MatValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: MatValue) -> MatValue {
        (self.f)(value)
    }
}

pub enum MatKind {
    Ignore,
    Atomic(ModuleId),
    Combine {
        combine: MatCombine,
        left: MatNode,
        right: MatNode,
    },
    Transform {
        transform: MatTransform,
        dep: MatNode,
    },
}

/// Node of a materialized-value computation tree.
///
/// Nodes are shared; two nodes are the same node when they point at the same
/// allocation, which is what fusing uses to track rewritten sub-trees.
#[derive(Clone)]
pub struct MatNode {
    kind: Arc<MatKind>,
}

impl MatNode {
    pub fn ignore() -> Self {
        Self::from_kind(MatKind::Ignore)
    }

    pub fn atomic(module: ModuleId) -> Self {
        Self::from_kind(MatKind::Atomic(module))
    }

    pub fn combine(combine: MatCombine, left: MatNode, right: MatNode) -> Self {
        Self::from_kind(MatKind::Combine {
            combine,
            left,
            right,
        })
    }

    pub fn transform(transform: MatTransform, dep: MatNode) -> Self {
        Self::from_kind(MatKind::Transform { transform, dep })
    }

    fn from_kind(kind: MatKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    pub fn kind(&self) -> &MatKind {
        &self.kind
    }

    /// Allocation identity of this node.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.kind) as *const () as usize
    }

    pub fn is_ignore(&self) -> bool {
        matches!(*self.kind, MatKind::Ignore)
    }

    /// Compute the value from the values materialized by the leaves.
    pub fn evaluate(
        &self,
        leaves: &HashMap<ModuleId, MatValue>,
    ) -> Result<MatValue, ConfigurationError> {
        match self.kind() {
            MatKind::Ignore => Ok(MatValue::NotUsed),
            MatKind::Atomic(id) => leaves.get(id).cloned().ok_or(
                ConfigurationError::MissingMaterializedValue { module: id.value() },
            ),
            MatKind::Combine {
                combine,
                left,
                right,
            } => Ok(combine.apply(left.evaluate(leaves)?, right.evaluate(leaves)?)),
            MatKind::Transform { transform, dep } => Ok(transform.apply(dep.evaluate(leaves)?)),
        }
    }

    /// Rebuild the tree with atomic references renamed through `ids`.
    pub fn substitute(&self, ids: &HashMap<ModuleId, ModuleId>) -> MatNode {
        match self.kind() {
            MatKind::Ignore => self.clone(),
            MatKind::Atomic(id) => match ids.get(id) {
                Some(new_id) => MatNode::atomic(*new_id),
                None => self.clone(),
            },
            MatKind::Combine {
                combine,
                left,
                right,
            } => MatNode::combine(*combine, left.substitute(ids), right.substitute(ids)),
            MatKind::Transform { transform, dep } => {
                MatNode::transform(transform.clone(), dep.substitute(ids))
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self.kind() {
            MatKind::Ignore => json!("ignore"),
            MatKind::Atomic(id) => json!({ "atomic": id.value() }),
            MatKind::Combine {
                combine,
                left,
                right,
            } => json!({
                "combine": combine,
                "left": left.to_json(),
                "right": right.to_json(),
            }),
            MatKind::Transform { transform, dep } => json!({
                "transform": transform.name(),
                "dep": dep.to_json(),
            }),
        }
    }
}

impl fmt::Debug for MatNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_strategies() {
        let l = || MatValue::value(1_u32);
        let r = || MatValue::value(2_u32);

        assert_eq!(MatCombine::KeepLeft.apply(l(), r()).downcast_ref::<u32>(), Some(&1));
        assert_eq!(MatCombine::KeepRight.apply(l(), r()).downcast_ref::<u32>(), Some(&2));
        assert!(MatCombine::KeepNone.apply(l(), r()).is_not_used());

        let both = MatCombine::KeepBoth.apply(l(), r());
        assert_eq!(both.left().and_then(|v| v.downcast_ref::<u32>()), Some(&1));
        assert_eq!(both.right().and_then(|v| v.downcast_ref::<u32>()), Some(&2));
    }

    #[test]
    fn test_evaluate_tree() {
        let a = ModuleId::next();
        let b = ModuleId::next();
        let mut leaves = HashMap::new();
        leaves.insert(a, MatValue::value(10_u32));
        leaves.insert(b, MatValue::value(5_u32));

        let doubled = MatTransform::new("double", |v| {
            let n = v.downcast_ref::<u32>().copied().unwrap_or_default();
            MatValue::value(n * 2)
        });
        let node = MatNode::combine(
            MatCombine::KeepRight,
            MatNode::atomic(a),
            MatNode::transform(doubled, MatNode::atomic(b)),
        );

        let value = node.evaluate(&leaves).unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&10));
    }

    #[test]
    fn test_evaluate_missing_leaf_is_error() {
        let missing = ModuleId::next();
        let err = MatNode::atomic(missing).evaluate(&HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingMaterializedValue {
                module: missing.value()
            }
        );
    }

    #[test]
    fn test_substitute_renames_leaves_only() {
        let old = ModuleId::next();
        let new = ModuleId::next();
        let untouched = ModuleId::next();
        let node = MatNode::combine(
            MatCombine::KeepBoth,
            MatNode::atomic(old),
            MatNode::atomic(untouched),
        );

        let ids = HashMap::from([(old, new)]);
        let renamed = node.substitute(&ids);
        match renamed.kind() {
            MatKind::Combine { left, right, .. } => {
                assert!(matches!(left.kind(), MatKind::Atomic(id) if *id == new));
                assert!(matches!(right.kind(), MatKind::Atomic(id) if *id == untouched));
            }
            _ => panic!("expected a combine node"),
        }
    }

    #[test]
    fn test_identity_is_per_allocation() {
        let node = MatNode::ignore();
        let alias = node.clone();
        assert_eq!(node.identity(), alias.identity());
        assert_ne!(node.identity(), MatNode::ignore().identity());
    }
}
