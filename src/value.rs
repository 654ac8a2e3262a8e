// Copyright ArborDB Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dynamically typed values exchanged with the database.
//!
//! [`ValueSend`] is what the client can send as statement parameters and
//! transaction metadata; [`ValueReceive`] is what the server can return in
//! records and summaries.

pub mod spatial;

use std::collections::HashMap;
use std::time::Duration;

use spatial::{Point2D, Point3D};

/// A value the client can send to the database.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSend {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ValueSend>),
    Map(HashMap<String, ValueSend>),
    Duration(Duration),
    Point2D(Point2D),
    Point3D(Point3D),
}

macro_rules! impl_value_send_from {
    ( $variant:ident, $($ty:ty),* ) => {
        $(
            impl From<$ty> for ValueSend {
                fn from(value: $ty) -> Self {
                    ValueSend::$variant(value.into())
                }
            }
        )*
    };
}

impl_value_send_from!(Boolean, bool);
impl_value_send_from!(Integer, u8, u16, u32, i8, i16, i32, i64);
impl_value_send_from!(Float, f32, f64);
impl_value_send_from!(String, String, &str);
impl_value_send_from!(Duration, Duration);
impl_value_send_from!(Point2D, Point2D);
impl_value_send_from!(Point3D, Point3D);

impl<T: Into<ValueSend>> From<Vec<T>> for ValueSend {
    fn from(value: Vec<T>) -> Self {
        ValueSend::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ValueSend>> From<HashMap<String, T>> for ValueSend {
    fn from(value: HashMap<String, T>) -> Self {
        ValueSend::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<ValueSend>> From<Option<T>> for ValueSend {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => ValueSend::Null,
        }
    }
}

/// A value received from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueReceive {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ValueReceive>),
    Map(HashMap<String, ValueReceive>),
    Duration(Duration),
    Point2D(Point2D),
    Point3D(Point3D),
}

impl ValueReceive {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<&String> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn try_into_bool(self) -> Result<bool, Self> {
        match self {
            Self::Boolean(v) => Ok(v),
            _ => Err(self),
        }
    }

    pub fn try_into_int(self) -> Result<i64, Self> {
        match self {
            Self::Integer(v) => Ok(v),
            _ => Err(self),
        }
    }

    pub fn try_into_string(self) -> Result<String, Self> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(self),
        }
    }

    pub fn try_into_list(self) -> Result<Vec<ValueReceive>, Self> {
        match self {
            Self::List(v) => Ok(v),
            _ => Err(self),
        }
    }

    pub fn try_into_map(self) -> Result<HashMap<String, ValueReceive>, Self> {
        match self {
            Self::Map(v) => Ok(v),
            _ => Err(self),
        }
    }
}

macro_rules! impl_value_receive_from {
    ( $variant:ident, $($ty:ty),* ) => {
        $(
            impl From<$ty> for ValueReceive {
                fn from(value: $ty) -> Self {
                    ValueReceive::$variant(value.into())
                }
            }
        )*
    };
}

impl_value_receive_from!(Boolean, bool);
impl_value_receive_from!(Integer, u8, u16, u32, i8, i16, i32, i64);
impl_value_receive_from!(Float, f32, f64);
impl_value_receive_from!(String, String, &str);
impl_value_receive_from!(Duration, Duration);
impl_value_receive_from!(Point2D, Point2D);
impl_value_receive_from!(Point3D, Point3D);

impl<T: Into<ValueReceive>> From<Vec<T>> for ValueReceive {
    fn from(value: Vec<T>) -> Self {
        ValueReceive::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ValueReceive>> From<HashMap<String, T>> for ValueReceive {
    fn from(value: HashMap<String, T>) -> Self {
        ValueReceive::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(ValueSend::from(1u8), ValueSend::Integer(1))]
    #[case(ValueSend::from(-1i32), ValueSend::Integer(-1))]
    #[case(ValueSend::from(1.5f32), ValueSend::Float(1.5))]
    #[case(ValueSend::from("foo"), ValueSend::String("foo".into()))]
    #[case(ValueSend::from(true), ValueSend::Boolean(true))]
    #[case(ValueSend::from(Option::<i64>::None), ValueSend::Null)]
    #[case(
        ValueSend::from(vec![1, 2]),
        ValueSend::List(vec![ValueSend::Integer(1), ValueSend::Integer(2)])
    )]
    fn send_conversions(#[case] input: ValueSend, #[case] expected: ValueSend) {
        assert_eq!(input, expected);
    }

    #[test]
    fn receive_accessors() {
        assert!(ValueReceive::Null.is_null());
        assert_eq!(ValueReceive::Integer(42).as_int(), Some(42));
        assert_eq!(ValueReceive::Integer(42).as_string(), None);
        assert_eq!(
            ValueReceive::String("x".into()).try_into_string().unwrap(),
            "x"
        );
        assert!(ValueReceive::Integer(1).try_into_string().is_err());
    }
}
