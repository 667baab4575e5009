/// Kind of example the stream carries.
///
/// Chosen once at configuration time; it selects which of the two
/// [`ExampleSource`](crate::ExampleSource) read operations the parser calls
/// for every example.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExampleKind {
    /// Each record carries a feature vector and a scalar label.
    Labelled,
    /// Each record carries a feature vector only.
    Unlabelled,
}

/// A single training example: a feature vector, its length and a label.
///
/// A valid example has `len >= 0` and `fv` holding exactly that many
/// elements. The label is meaningless for an
/// [`Unlabelled`](ExampleKind::Unlabelled) stream and must not be inspected.
///
/// The vector storage is owned by the ring slot the example lives in. When
/// the parser is configured to reuse slot storage, `fv` keeps its allocation
/// across examples and is overwritten in place.
#[derive(Debug)]
pub struct Example<T> {
    /// Feature vector storage.
    pub fv: Vec<T>,
    /// Number of features in `fv`.
    pub len: i32,
    /// Scalar label, if the stream is labelled.
    pub label: f64,
}

impl<T> Example<T> {
    /// An empty slot payload. `len` is negative until a record is parsed
    /// into it.
    pub(crate) fn empty() -> Self {
        Self {
            fv: Vec::new(),
            len: -1,
            label: -1.0,
        }
    }
}
