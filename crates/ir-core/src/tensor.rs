use crate::dtype::DType;
use crate::error::{CoreError, Result};
use crate::gemm;
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A tensor backed by CPU storage.
///
/// Holds contiguous, row-major f32 data with an associated shape and dtype.
/// `grad` is `Some` only for tensors created with `needs_grad = true`;
/// this crate never populates it itself — it exists so callers building
/// an autodiff layer on top have somewhere to accumulate into.
#[derive(Debug, Clone)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
    dtype: DType,
    grad: Option<Vec<f32>>,
}

impl Tensor {
    /// Create a new tensor from f32 data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: Shape) -> Self {
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {:?} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::from_f32_vec(data),
            shape,
            dtype: DType::F32,
            grad: None,
        }
    }

    /// Create a zero-filled tensor with the given shape.
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.numel();
        Tensor {
            storage: CpuStorage::from_f32_vec(vec![0.0; n]),
            shape,
            dtype: DType::F32,
            grad: None,
        }
    }

    /// Create a tensor filled with ones with the given shape.
    pub fn ones(shape: Shape) -> Self {
        let n = shape.numel();
        Tensor {
            storage: CpuStorage::from_f32_vec(vec![1.0; n]),
            shape,
            dtype: DType::F32,
            grad: None,
        }
    }

    /// Create a zero-filled tensor drawn from a `WorkspaceMap` instead of a
    /// fresh allocation: moves the existing buffer under `key` out of the
    /// workspace (zeroed) instead of cloning it, so no per-call heap copy
    /// occurs. Prefer this over `zeros` inside a hot decode loop.
    pub fn new_from_workspace(workspace: &mut crate::workspace::WorkspaceMap, key: &str, shape: Shape, needs_grad: bool) -> Result<Tensor> {
        let data = workspace.take(key, &shape)?;
        let mut t = Tensor::new(data, shape);
        if needs_grad {
            t.grad = Some(vec![0.0; t.shape.numel()]);
        }
        Ok(t)
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the underlying data as an f32 slice.
    ///
    /// # Panics
    /// Panics if the storage is not F32 (quantized dtypes are not yet
    /// materialized by this crate).
    pub fn data_f32(&self) -> &[f32] {
        self.storage
            .as_f32_slice()
            .expect("tensor storage is not F32")
    }

    /// Returns the gradient buffer, if this tensor was created with
    /// `needs_grad = true`.
    pub fn grad(&self) -> Option<&[f32]> {
        self.grad.as_deref()
    }

    /// Returns the gradient buffer mutably, if present.
    pub fn grad_mut(&mut self) -> Option<&mut [f32]> {
        self.grad.as_deref_mut()
    }

    /// Reshape the tensor, returning a new tensor with the same data but
    /// a different shape.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: Shape) -> Result<Tensor> {
        if self.shape.numel() != new_shape.numel() {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            dtype: self.dtype,
            grad: self.grad.clone(),
        })
    }

    /// Matrix multiplication of two 2D tensors, dispatched through the L2
    /// GEMM engine (`gemm::matmul`).
    ///
    /// self is [m, k], other is [k, n], result is [m, n].
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        if self.shape.ndim() != 2 || other.shape.ndim() != 2 {
            return Err(CoreError::Other("matmul requires 2D tensors".to_string()));
        }

        let m = self.shape.dim(0);
        let k = self.shape.dim(1);
        let k2 = other.shape.dim(0);
        let n = other.shape.dim(1);

        if k != k2 {
            return Err(CoreError::DimensionMismatch { m, k, k2, n });
        }

        let mut result_data = vec![0.0f32; m * n];
        gemm::matmul(self.data_f32(), other.data_f32(), &mut result_data, m, k, n, false)?;
        Ok(Tensor::new(result_data, Shape::new(vec![m, n])))
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceMap;

    #[test]
    fn test_new_tensor() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![2, 3]));
        assert_eq!(t.shape().ndim(), 2);
        assert_eq!(t.shape().dim(0), 2);
        assert_eq!(t.shape().dim(1), 3);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.data_f32(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_zeros_ones() {
        let z = Tensor::zeros(Shape::new(vec![2, 3]));
        assert_eq!(z.data_f32(), &[0.0; 6]);

        let o = Tensor::ones(Shape::new(vec![3]));
        assert_eq!(o.data_f32(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![2, 3]));
        let r = t.reshape(Shape::new(vec![3, 2])).unwrap();
        assert_eq!(r.shape().dims(), &[3, 2]);
        assert_eq!(r.data_f32(), t.data_f32());
    }

    #[test]
    fn test_reshape_mismatch() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0], Shape::new(vec![3]));
        assert!(t.reshape(Shape::new(vec![2, 2])).is_err());
    }

    #[test]
    #[should_panic]
    fn test_new_shape_mismatch_panics() {
        let _t = Tensor::new(vec![1.0, 2.0], Shape::new(vec![3]));
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]));
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], Shape::new(vec![2, 2]));
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 2]);
        assert_eq!(c.data_f32(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0], Shape::new(vec![1, 3]));
        let b = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]));
        assert!(a.matmul(&b).is_err());
    }

    #[test]
    fn test_new_from_workspace_needs_grad() {
        let mut ws = WorkspaceMap::new();
        let t = Tensor::new_from_workspace(&mut ws, "hidden", Shape::new(vec![2, 2]), true).unwrap();
        assert_eq!(t.data_f32(), &[0.0; 4]);
        assert_eq!(t.grad().unwrap().len(), 4);
    }

    #[test]
    fn test_new_from_workspace_moves_allocation_without_copying() {
        let mut ws = WorkspaceMap::new();
        let ptr_before = ws.get_or_create("hidden", &Shape::new(vec![4])).unwrap().as_ptr();
        let t = Tensor::new_from_workspace(&mut ws, "hidden", Shape::new(vec![4]), false).unwrap();
        assert_eq!(t.data_f32().as_ptr(), ptr_before);
    }
}
