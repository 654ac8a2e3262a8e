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

use std::ops::{Add, AddAssign};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

/// An ordered collection of opaque causal-consistency tokens.
///
/// Bookmarks are handed out by the server on every successful commit and
/// establish a causal order between transactions (see
/// [crate docs](crate#causal-consistency)).
/// The driver treats them as opaque strings; order is preserved and
/// duplicates are dropped (first occurrence wins).
///
/// For joining causal chains, bookmarks implement [`Add`] and [`AddAssign`]
/// on both owned and borrowed values.
///
/// # Example
/// ```
/// use arbordb::bookmarks::Bookmarks;
///
/// let bm1 = Bookmarks::from_raw(["a", "b"].map(String::from));
/// let bm2 = Bookmarks::from_raw(["b", "c"].map(String::from));
///
/// let union = bm1 + &bm2;
/// assert_eq!(union.raw().collect::<Vec<_>>(), vec!["a", "b", "c"]);
/// assert_eq!(union.last_bookmark(), Some("c"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmarks {
    bookmarks: Vec<Arc<String>>,
}

impl Bookmarks {
    /// Creates a new [`Bookmarks`] instance from the given raw bookmarks.
    ///
    /// This method is mainly intended for testing and deserialization.
    pub fn from_raw(raw: impl IntoIterator<Item = String>) -> Self {
        let mut bookmarks = Bookmarks::default();
        for bookmark in raw {
            bookmarks.push_unique(Arc::new(bookmark));
        }
        bookmarks
    }

    /// Creates a new [`Bookmarks`] containing no bookmarks.
    ///
    /// This is equivalent to [`Bookmarks::default()`].
    #[inline]
    pub fn empty() -> Self {
        Default::default()
    }

    /// Return the count of contained bookmarks.
    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    /// Returns `true` if this [`Bookmarks`] contains no bookmarks.
    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// The most recently appended bookmark, or [`None`] when empty.
    pub fn last_bookmark(&self) -> Option<&str> {
        self.bookmarks.last().map(|bm| bm.as_str())
    }

    /// Return an iterator over the raw contained bookmarks, in order.
    pub fn raw(&self) -> impl Iterator<Item = &str> {
        self.bookmarks.iter().map(|bm| bm.as_str())
    }

    /// Turn these [`Bookmarks`] into an iterator over the raw contained
    /// bookmarks, in order.
    pub fn into_raw(self) -> impl Iterator<Item = String> {
        self.bookmarks
            .into_iter()
            .map(|bm| Arc::try_unwrap(bm).unwrap_or_else(|bm| String::from(&*bm)))
    }

    fn push_unique(&mut self, bookmark: Arc<String>) {
        if !self.bookmarks.contains(&bookmark) {
            self.bookmarks.push(bookmark);
        }
    }
}

impl Add for Bookmarks {
    type Output = Bookmarks;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Add<&Bookmarks> for Bookmarks {
    type Output = Bookmarks;

    fn add(mut self, rhs: &Bookmarks) -> Self::Output {
        self += rhs;
        self
    }
}

impl Add<Bookmarks> for &Bookmarks {
    type Output = Bookmarks;

    fn add(self, rhs: Bookmarks) -> Self::Output {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Add<&Bookmarks> for &Bookmarks {
    type Output = Bookmarks;

    fn add(self, rhs: &Bookmarks) -> Self::Output {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl AddAssign<Bookmarks> for Bookmarks {
    fn add_assign(&mut self, rhs: Bookmarks) {
        for bookmark in rhs.bookmarks {
            self.push_unique(bookmark);
        }
    }
}

impl AddAssign<&Bookmarks> for Bookmarks {
    fn add_assign(&mut self, rhs: &Bookmarks) {
        for bookmark in &rhs.bookmarks {
            self.push_unique(Arc::clone(bookmark));
        }
    }
}

/// The session's live bookmark cell.
///
/// Shared between the session, its transactions, and its auto-commit cursors
/// so that whichever of them observes the commit can publish the new
/// bookmarks.
#[derive(Debug, Clone, Default)]
pub(crate) struct BookmarksHolder {
    inner: Arc<AtomicRefCell<Bookmarks>>,
}

impl BookmarksHolder {
    pub(crate) fn new(bookmarks: Bookmarks) -> Self {
        Self {
            inner: Arc::new(AtomicRefCell::new(bookmarks)),
        }
    }

    pub(crate) fn current(&self) -> Bookmarks {
        self.inner.borrow().clone()
    }

    /// Replace the session's bookmarks with those returned by the server.
    /// An empty replacement is ignored.
    pub(crate) fn replace(&self, bookmarks: Bookmarks) {
        if bookmarks.is_empty() {
            return;
        }
        *self.inner.borrow_mut() = bookmarks;
    }

    pub(crate) fn last_bookmark(&self) -> Option<String> {
        self.inner.borrow().last_bookmark().map(String::from)
    }
}
