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

use std::iter;
use std::ops::Deref;
use std::sync::Arc;

use crate::value::ValueReceive;

/// A record is a collection of key-value pairs that represent a single row of
/// a query result.
#[derive(Debug, Clone)]
pub struct Record {
    entries: Vec<(Arc<String>, Option<ValueReceive>)>,
}

impl Record {
    /// Build a record from the result's keys and one row of values.
    ///
    /// # Panics
    /// Panics when `keys` and `values` differ in length.
    pub fn new(keys: &[Arc<String>], values: Vec<ValueReceive>) -> Self {
        assert_eq!(keys.len(), values.len());
        Self {
            entries: iter::zip(keys.iter().map(Arc::clone), values.into_iter().map(Some)).collect(),
        }
    }

    /// Iterate over the keys of the record.
    /// The order of the keys corresponds to the order of the values.
    pub fn keys(&self) -> impl Iterator<Item = Arc<String>> + '_ {
        self.entries
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|_| Arc::clone(key)))
    }

    /// Iterate over the values of the record.
    /// The order of the values corresponds to the order of the keys.
    pub fn values(&self) -> impl Iterator<Item = &ValueReceive> {
        self.entries
            .iter()
            .map(|(_, value)| value)
            .filter_map(Option::as_ref)
    }

    /// Iterate over the values of the record, consuming it.
    pub fn into_values(self) -> impl Iterator<Item = ValueReceive> {
        self.entries.into_iter().filter_map(|(_, value)| value)
    }

    /// Get the value for the given key or [`None`] if the key does not exist.
    pub fn value(&self, key: &str) -> Option<&ValueReceive> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
            .find_map(|(k, v)| if k.deref() == key { Some(v) } else { None })
    }

    /// Get the value at the given field index or [`None`] if out of range.
    pub fn value_at(&self, index: usize) -> Option<&ValueReceive> {
        self.entries
            .get(index)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Get the value for the given key or [`None`] if the key does not exist.
    ///
    /// This is the same as [`Record::value()`], but it removes the entry and
    /// returns an owned value.
    pub fn take_value(&mut self, key: &str) -> Option<ValueReceive> {
        self.entries
            .iter_mut()
            .filter(|(k, _)| k.deref() == key)
            .find_map(|(_, v)| v.take())
    }
}
