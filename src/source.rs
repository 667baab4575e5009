use crate::example::{Example, ExampleKind};

/// The decoding layer beneath the parser.
///
/// Implementations decode records from a file, socket or generator into
/// feature vectors. The parser calls exactly one of the two operations for
/// the whole stream, chosen by [`ExampleKind`] at configuration time.
///
/// The returned value is the number of features written to `fv`. A
/// non-positive return signals end of stream; implementations must convert
/// lower-level I/O errors to a negative length rather than panic. `fv` may
/// arrive holding a previous example's contents (the ring reuses slot
/// storage) and must be overwritten, not appended to.
pub trait ExampleSource<T>: Send {
    /// Decodes the next unlabelled example into `fv`.
    fn read_vector(&mut self, fv: &mut Vec<T>) -> i32;

    /// Decodes the next labelled example into `fv` and `label`.
    fn read_vector_and_label(&mut self, fv: &mut Vec<T>, label: &mut f64) -> i32;
}

/// Binds a boxed source to the read operation chosen at configuration time.
pub(crate) struct SourceAdapter<T> {
    source: Box<dyn ExampleSource<T>>,
    kind: ExampleKind,
}

impl<T> SourceAdapter<T> {
    pub(crate) fn new(source: Box<dyn ExampleSource<T>>, kind: ExampleKind) -> Self {
        Self { source, kind }
    }

    /// Reads the next record into the slot payload.
    ///
    /// Returns `false` at end of stream: any non-positive length, which
    /// covers clean EOF, malformed zero-length records and I/O errors the
    /// source converted to a negative length. On `false` the payload length
    /// stays negative and the example is never published.
    pub(crate) fn read_into(&mut self, example: &mut Example<T>) -> bool {
        let len = match self.kind {
            ExampleKind::Labelled => self
                .source
                .read_vector_and_label(&mut example.fv, &mut example.label),
            ExampleKind::Unlabelled => self.source.read_vector(&mut example.fv),
        };
        if len <= 0 {
            return false;
        }
        example.len = len;
        true
    }
}

/// In-memory stream source over a prepared list of examples.
///
/// Yields each example once in order, then signals end of stream. Useful
/// for tests, benchmarks and docs; real deployments implement
/// [`ExampleSource`] over their own decoding layer.
pub struct VecSource<T> {
    examples: std::vec::IntoIter<(Vec<T>, f64)>,
}

impl<T> VecSource<T> {
    /// A source over `(features, label)` pairs.
    pub fn labelled(examples: Vec<(Vec<T>, f64)>) -> Self {
        Self {
            examples: examples.into_iter(),
        }
    }

    /// A source over bare feature vectors.
    pub fn unlabelled(examples: Vec<Vec<T>>) -> Self {
        Self {
            examples: examples
                .into_iter()
                .map(|fv| (fv, 0.0))
                .collect::<Vec<_>>()
                .into_iter(),
        }
    }
}

impl<T: Send> ExampleSource<T> for VecSource<T> {
    fn read_vector(&mut self, fv: &mut Vec<T>) -> i32 {
        let mut label = 0.0;
        self.read_vector_and_label(fv, &mut label)
    }

    fn read_vector_and_label(&mut self, fv: &mut Vec<T>, label: &mut f64) -> i32 {
        match self.examples.next() {
            Some((features, l)) => {
                fv.clear();
                let len = features.len();
                fv.extend(features);
                *label = l;
                len as i32
            }
            None => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_yields_in_order_then_eof() {
        let mut source = VecSource::labelled(vec![(vec![1, 2], 0.0), (vec![3], 1.0)]);
        let mut fv = Vec::new();
        let mut label = 0.0;

        assert_eq!(source.read_vector_and_label(&mut fv, &mut label), 2);
        assert_eq!(fv, vec![1, 2]);
        assert_eq!(label, 0.0);

        assert_eq!(source.read_vector_and_label(&mut fv, &mut label), 1);
        assert_eq!(fv, vec![3]);
        assert_eq!(label, 1.0);

        assert_eq!(source.read_vector_and_label(&mut fv, &mut label), -1);
    }

    #[test]
    fn test_adapter_collapses_empty_record_to_eof() {
        let source = VecSource::labelled(vec![(vec![7], 0.0), (Vec::new(), 0.0)]);
        let mut adapter = SourceAdapter::new(Box::new(source), ExampleKind::Labelled);
        let mut example = Example::empty();

        assert!(adapter.read_into(&mut example));
        assert_eq!(example.len, 1);

        // Zero-length record reads as end of stream.
        assert!(!adapter.read_into(&mut example));
    }

    #[test]
    fn test_adapter_unlabelled_ignores_label() {
        let source = VecSource::unlabelled(vec![vec![4, 5, 6]]);
        let mut adapter = SourceAdapter::new(Box::new(source), ExampleKind::Unlabelled);
        let mut example = Example::empty();

        assert!(adapter.read_into(&mut example));
        assert_eq!(example.fv, vec![4, 5, 6]);
        assert_eq!(example.len, 3);
        assert!(!adapter.read_into(&mut example));
    }
}
