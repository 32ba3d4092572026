// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::StreamError;
use std::any::{type_name, Any};

/// An element travelling along a connection.
pub type Element = Box<dyn Any + Send>;

/// Unbox an element into the type a stage expects.
pub fn downcast_element<T: Any>(element: Element) -> Result<T, StreamError> {
    element
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| StreamError::ElementType {
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_matching_type() {
        let element: Element = Box::new(7_i64);
        assert_eq!(downcast_element::<i64>(element).unwrap(), 7);
    }

    #[test]
    fn test_downcast_wrong_type_reports_expected() {
        let element: Element = Box::new("seven");
        let err = downcast_element::<i64>(element).unwrap_err();
        assert_eq!(err, StreamError::ElementType { expected: "i64" });
    }
}
