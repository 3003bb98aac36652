//! Tensor containers exchanged with a [`Decoder`](crate::engine::decoder::Decoder).
//!
//! [`Tensor`] holds the f32 logits produced by one decode step. [`TokenTensor`]
//! is the `[1, N]` token-id buffer handed to the decoder: a single slot in
//! incremental mode, the full growing history otherwise.

use tracing::trace;

use crate::error::InferenceError;

/// Row-major f32 tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data: Vec<f32>,
}

/// Compute row-major strides from shape.
/// strides[i] = product of shape[i+1..]
fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; shape.len()];
    if shape.is_empty() {
        return strides;
    }
    strides[shape.len() - 1] = 1;
    for i in (0..shape.len() - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl Tensor {
    /// Create a tensor from shape and data.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the product of `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        let n_elements: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            n_elements,
            "Data length {} does not match shape {:?} (expected {})",
            data.len(),
            shape,
            n_elements
        );
        let strides = compute_strides(&shape);
        trace!(?shape, "Created tensor");
        Self { shape, strides, data }
    }

    /// Fallible variant of [`Tensor::new`] for data coming from outside the crate.
    pub fn try_new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, InferenceError> {
        let n_elements: usize = shape.iter().product();
        if data.len() != n_elements {
            return Err(InferenceError::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(Self::new(shape, data))
    }

    /// Create a zero-filled tensor.
    pub fn zeros(shape: &[usize]) -> Self {
        let n_elements: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            strides: compute_strides(shape),
            data: vec![0.0f32; n_elements],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn n_elements(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// The innermost row at the last position, i.e. the logits for the
    /// token following the final input token.
    ///
    /// For a `[1, vocab]` tensor this is the whole buffer; for
    /// `[1, n, vocab]` it is the `n - 1`th row. A 0-d tensor yields an
    /// empty slice.
    pub fn last_row(&self) -> &[f32] {
        let Some(&width) = self.shape.last() else {
            return &[];
        };
        let len = self.data.len();
        if width == 0 || len < width {
            return &[];
        }
        &self.data[len - width..]
    }
}

/// Token-id buffer of shape `[1, N]` fed to a decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTensor {
    ids: Vec<u32>,
    shape: [usize; 2],
}

impl TokenTensor {
    /// A `[1, 1]` buffer holding one token.
    pub fn single(token: u32) -> Self {
        Self {
            ids: vec![token],
            shape: [1, 1],
        }
    }

    /// A `[1, N]` buffer holding a copy of `ids`.
    pub fn from_ids(ids: &[u32]) -> Self {
        Self {
            ids: ids.to_vec(),
            shape: [1, ids.len()],
        }
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.ids.last().copied()
    }

    /// Overwrite the final slot in place. No-op on an empty buffer.
    pub(crate) fn set_last(&mut self, token: u32) {
        if let Some(slot) = self.ids.last_mut() {
            *slot = token;
        }
    }

    /// Append a token and widen the shape to `[1, N + 1]`.
    pub(crate) fn push(&mut self, token: u32) {
        self.ids.push(token);
        self.shape = [1, self.ids.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::zeros(&[2, 3, 4]);
        assert_eq!(t.strides(), &[12, 4, 1]);
        assert_eq!(t.n_elements(), 24);
    }

    #[test]
    #[should_panic(expected = "does not match shape")]
    fn test_new_wrong_length_panics() {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_try_new_wrong_length() {
        let result = Tensor::try_new(vec![1, 4], vec![0.0; 3]);
        match result {
            Err(InferenceError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![1, 4]);
                assert_eq!(actual, vec![3]);
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_last_row_2d() {
        let t = Tensor::new(vec![1, 3], vec![0.1, 0.2, 0.3]);
        assert_eq!(t.last_row(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_last_row_3d_picks_final_position() {
        let t = Tensor::new(vec![1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.last_row(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_last_row_scalar_is_empty() {
        let t = Tensor::new(vec![], vec![1.0]);
        assert!(t.last_row().is_empty());
    }

    #[test]
    fn test_as_mut_slice() {
        let mut t = Tensor::zeros(&[3]);
        t.as_mut_slice()[1] = 9.0;
        assert_eq!(t.as_slice(), &[0.0, 9.0, 0.0]);
    }

    #[test]
    fn test_token_tensor_single() {
        let mut t = TokenTensor::single(5);
        assert_eq!(t.shape(), &[1, 1]);
        t.set_last(7);
        assert_eq!(t.ids(), &[7]);
        assert_eq!(t.shape(), &[1, 1]);
    }

    #[test]
    fn test_token_tensor_push_grows_shape() {
        let mut t = TokenTensor::from_ids(&[1, 2, 3]);
        assert_eq!(t.shape(), &[1, 3]);
        t.push(4);
        assert_eq!(t.shape(), &[1, 4]);
        assert_eq!(t.ids(), &[1, 2, 3, 4]);
        assert_eq!(t.last(), Some(4));
    }

    #[test]
    fn test_token_tensor_empty() {
        let mut t = TokenTensor::from_ids(&[]);
        assert!(t.is_empty());
        assert_eq!(t.last(), None);
        t.set_last(3);
        assert!(t.is_empty());
    }
}
