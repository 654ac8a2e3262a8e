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

// imports for docs
#[allow(unused)]
use crate::ValueSend;

#[cfg(test)]
macro_rules! hash_map {
    () => {std::collections::HashMap::new()};
    ( $($key:expr => $value:expr),* $(,)? ) => {
        {
            let mut m = std::collections::HashMap::new();
            $(
                m.insert($key, $value);
            )*
            m
        }
    };
}

#[cfg(test)]
pub(crate) use hash_map;

/// Short notation for creating a [`ValueSend`].
///
/// `null`, list, and map literals are understood; everything else is passed
/// through [`Into<ValueSend>`].
///
/// # Examples
/// ```
/// use arbordb::{value, ValueSend};
///
/// assert_eq!(value!(null), ValueSend::Null);
/// assert_eq!(value!(1), ValueSend::Integer(1));
/// assert_eq!(
///     value!([1, null]),
///     ValueSend::List(vec![ValueSend::Integer(1), ValueSend::Null])
/// );
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::ValueSend::Null
    };
    ([ $($item:tt),* $(,)? ]) => {
        $crate::ValueSend::List(vec![ $( $crate::value!($item) ),* ])
    };
    ({ $($key:literal : $val:tt),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = std::collections::HashMap::<String, $crate::ValueSend>::new();
            $(
                map.insert(String::from($key), $crate::value!($val));
            )*
            $crate::ValueSend::Map(map)
        }
    };
    ($other:expr) => {
        $crate::ValueSend::from($other)
    };
}

/// Short notation for creating a `HashMap<String, ValueSend>`, e.g., for
/// statement parameters.
///
/// # Examples
/// ```
/// use arbordb::{value_map, ValueSend};
///
/// let parameters = value_map!({"x": 1, "who": "alice"});
/// assert_eq!(parameters["x"], ValueSend::Integer(1));
/// assert_eq!(parameters["who"], ValueSend::String("alice".into()));
///
/// assert!(value_map!().is_empty());
/// ```
#[macro_export]
macro_rules! value_map {
    ($(,)?) => {
        std::collections::HashMap::<String, $crate::ValueSend>::new()
    };
    ({ $($key:literal : $val:tt),* $(,)? }) => {
        {
            let mut map = std::collections::HashMap::<String, $crate::ValueSend>::new();
            $(
                map.insert(String::from($key), $crate::value!($val));
            )*
            map
        }
    };
}
