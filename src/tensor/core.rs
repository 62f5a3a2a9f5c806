use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use rand::distributions::Uniform;
use rand::prelude::Distribution;
use rand::Rng;
use tracing::instrument;

/// Shared buffer backing a tensor's values or its gradient
pub type Storage = Rc<RefCell<Vec<f32>>>;

/// Main tensor struct that holds data and gradient information
///
/// A `Tensor` is a handle: cloning it shares both the value buffer and the
/// gradient buffer. This is what lets an optimizer update a parameter in place
/// while the model (or trajectory driver) keeps its own handle to it.
#[derive(Clone)]
pub struct Tensor {
    data: Storage,
    pub shape: Vec<usize>,
    numel: usize,
    pub grad: Storage,
    pub requires_grad: bool,
    // Graph node for backward pass (only created when requires_grad is true)
    graph_node: Option<Rc<GraphNode>>,
}

/// Takes no arguments, returns nothing - it directly mutates gradients via captured references
type BackwardFn = Box<dyn Fn()>;

/// GraphNode represents a node in the computation graph
/// Separates graph structure from tensor data
pub struct GraphNode {
    // Name of the operation for tracing
    name: &'static str,
    backward_fn: BackwardFn,
    // Parent nodes in the computation graph (Rc since DAG has no cycles)
    prev: Vec<Rc<GraphNode>>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &*self.data.borrow())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}

impl Tensor {
    /// Create a new tensor from data and shape
    #[instrument(skip(data), fields(shape = ?shape, numel = data.len()))]
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        if numel != data.len() {
            panic!(
                "Invalid shape: {:?} for data of length: {}",
                shape,
                data.len()
            )
        }

        Tensor {
            data: Rc::new(RefCell::new(data)),
            shape,
            numel,
            grad: Rc::new(RefCell::new(vec![0.0; numel])),
            requires_grad: false,
            graph_node: None,
        }
    }

    /// Single-element tensor of shape [1]
    pub fn scalar(value: f32) -> Self {
        Tensor::new(vec![value], vec![1])
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Tensor::new(vec![0.0; numel], shape)
    }

    pub fn ones(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Tensor::new(vec![1.0; numel], shape)
    }

    /// Create a tensor with random values between -1 and 1
    pub fn randn(shape: Vec<usize>) -> Self {
        Self::randn_with_rng(shape, &mut rand::thread_rng())
    }

    /// Same as [`Tensor::randn`], drawing from the given generator
    #[instrument(skip(rng), fields(shape = ?shape))]
    pub fn randn_with_rng<R: Rng + ?Sized>(shape: Vec<usize>, rng: &mut R) -> Self {
        let numel = shape.iter().product::<usize>();
        let mut data: Vec<f32> = vec![0.0; numel];

        let uniform = Uniform::new(-1.0f32, 1.0f32);
        for x in data.iter_mut() {
            *x = uniform.sample(&mut *rng);
        }

        Tensor::new(data, shape)
    }

    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Borrow the current values
    pub fn data(&self) -> Ref<'_, Vec<f32>> {
        self.data.borrow()
    }

    /// Mutably borrow the current values
    ///
    /// Writes through this borrow are plain numeric mutation and are never
    /// recorded in the computation graph.
    pub fn data_mut(&self) -> RefMut<'_, Vec<f32>> {
        self.data.borrow_mut()
    }

    /// Copy of the current values
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.borrow().clone()
    }

    /// Value of a single-element tensor
    pub fn item(&self) -> f32 {
        assert_eq!(
            self.numel, 1,
            "item() requires a single-element tensor, got shape {:?}",
            self.shape
        );
        self.data.borrow()[0]
    }

    /// Handle to the value buffer, shared with every clone of this tensor
    pub fn data_storage(&self) -> Storage {
        Rc::clone(&self.data)
    }

    /// Handle to the gradient buffer, shared with every clone of this tensor
    pub fn grad_storage(&self) -> Storage {
        Rc::clone(&self.grad)
    }

    /// Builder method to enable gradient tracking
    pub fn requires_grad(mut self, req: bool) -> Self {
        self.requires_grad = req;
        self
    }

    /// Zero out all gradients
    #[instrument(skip(self), fields(shape = ?self.shape, numel = self.numel))]
    pub fn zero_grad(&self) {
        self.grad.borrow_mut().fill(0.0);
    }

    /// Copy of the values with a fresh gradient and no graph history
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.to_vec(), self.shape.clone())
    }

    /// Stack same-shaped tensors along a new leading axis
    ///
    /// The result is not tracked for gradients.
    #[instrument(skip(tensors), fields(count = tensors.len()))]
    pub fn stack(tensors: &[Tensor]) -> Tensor {
        assert!(!tensors.is_empty(), "Cannot stack an empty list of tensors");
        let inner = tensors[0].shape.clone();

        let mut data = Vec::with_capacity(tensors.len() * tensors[0].numel);
        for t in tensors {
            assert_eq!(t.shape, inner, "Shape mismatch in stack");
            data.extend_from_slice(&t.data.borrow());
        }

        let mut shape = vec![tensors.len()];
        shape.extend(inner);
        Tensor::new(data, shape)
    }

    /// Helper to attach gradient tracking to a result tensor
    /// Takes parent tensors and a backward closure, sets up the computation graph
    pub fn with_grad(
        mut result: Tensor,
        parents: Vec<&Tensor>,
        name: &'static str,
        backward_fn: BackwardFn,
    ) -> Tensor {
        result.requires_grad = true;

        // Leaves carry no graph node, their gradients are reached through the closure
        let parent_nodes: Vec<Rc<GraphNode>> = parents
            .iter()
            .filter_map(|p| p.graph_node.as_ref().map(Rc::clone))
            .collect();

        let node = Rc::new(GraphNode {
            name,
            backward_fn,
            prev: parent_nodes,
        });

        result.graph_node = Some(node);
        result
    }

    /// Helper for same-shape binary operations with gradient tracking
    ///
    /// `grad_fn` receives (grad_output, self_grad, other_grad) and accumulates into both.
    fn binary_op<F>(
        &self,
        other: &Tensor,
        result_data: Vec<f32>,
        op_name: &'static str,
        grad_fn: F,
    ) -> Tensor
    where
        F: Fn(&[f32], &mut [f32], &mut [f32]) + 'static,
    {
        let result = Tensor::new(result_data, self.shape.clone());

        if self.requires_grad || other.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let other_grad = Rc::clone(&other.grad);
            let result_grad = Rc::clone(&result.grad);

            // x.add(&x) and friends: both sides share one gradient buffer
            let same_tensor = Rc::ptr_eq(&self_grad, &other_grad);

            Self::with_grad(
                result,
                vec![self, other],
                op_name,
                Box::new(move || {
                    let grad_output = result_grad.borrow();

                    if same_tensor {
                        let mut grad = self_grad.borrow_mut();
                        let mut temp_grad = vec![0.0; grad.len()];
                        grad_fn(&grad_output, &mut grad, &mut temp_grad);
                        for (g, t) in grad.iter_mut().zip(&temp_grad) {
                            *g += t;
                        }
                    } else {
                        let mut self_g = self_grad.borrow_mut();
                        let mut other_g = other_grad.borrow_mut();
                        grad_fn(&grad_output, &mut self_g, &mut other_g);
                    }
                }),
            )
        } else {
            result
        }
    }

    /// Helper for element-wise unary operations with gradient tracking
    ///
    /// `grad_fn` receives (grad_output, self_grad) and accumulates into self_grad.
    fn unary_op<F>(&self, result_data: Vec<f32>, op_name: &'static str, grad_fn: F) -> Tensor
    where
        F: Fn(&[f32], &mut [f32]) + 'static,
    {
        let result = Tensor::new(result_data, self.shape.clone());

        if self.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let result_grad = Rc::clone(&result.grad);

            Self::with_grad(
                result,
                vec![self],
                op_name,
                Box::new(move || {
                    let grad_output = result_grad.borrow();
                    let mut self_g = self_grad.borrow_mut();
                    grad_fn(&grad_output, &mut self_g);
                }),
            )
        } else {
            result
        }
    }

    fn zip_map(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Vec<f32> {
        assert_eq!(self.shape, other.shape, "Shape mismatch");
        let a = self.data.borrow();
        let b = other.data.borrow();
        a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> Vec<f32> {
        self.data.borrow().iter().map(|&x| f(x)).collect()
    }

    /// Select element `i` as a shape-[1] tensor
    ///
    /// The gradient flows back into position `i` only.
    #[instrument(skip(self), fields(shape = ?self.shape, index = i))]
    pub fn index(&self, i: usize) -> Tensor {
        assert!(
            i < self.numel,
            "Index {} out of bounds for tensor with {} elements",
            i,
            self.numel
        );
        let result = Tensor::scalar(self.data.borrow()[i]);

        if self.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let result_grad = Rc::clone(&result.grad);

            Self::with_grad(
                result,
                vec![self],
                "index_backward",
                Box::new(move || {
                    let _span = tracing::info_span!("IndexBackward").entered();
                    self_grad.borrow_mut()[i] += result_grad.borrow()[0];
                }),
            )
        } else {
            result
        }
    }

    /// Matrix multiplication
    #[instrument(skip(self, other), fields(shape_a = ?self.shape, shape_b = ?other.shape))]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        let data = super::kernels::matmul(
            &self.data.borrow(),
            &self.shape,
            &other.data.borrow(),
            &other.shape,
        );
        let result = Tensor::new(data, vec![self.shape[0], other.shape[1]]);

        if self.requires_grad || other.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let other_grad = Rc::clone(&other.grad);
            let result_grad = Rc::clone(&result.grad);

            assert!(
                !Rc::ptr_eq(&self_grad, &other_grad),
                "Self-matmul (x.matmul(&x)) is not supported"
            );

            // Snapshot the operands: the values may be stepped before backward runs again
            let self_data = self.to_vec();
            let self_shape = self.shape.clone();
            let other_data = other.to_vec();
            let other_shape = other.shape.clone();

            Self::with_grad(
                result,
                vec![self, other],
                "matmul_backward",
                Box::new(move || {
                    let _span = tracing::info_span!("MatMulBackward").entered();
                    let grad_output = result_grad.borrow();
                    let grad_shape = [self_shape[0], other_shape[1]];

                    // dL/dA = grad_output @ B^T
                    super::kernels::matmul_backward_left(
                        &grad_output,
                        &grad_shape,
                        &other_data,
                        &other_shape,
                        &mut self_grad.borrow_mut(),
                    );

                    // dL/dB = A^T @ grad_output
                    super::kernels::matmul_backward_right(
                        &self_data,
                        &self_shape,
                        &grad_output,
                        &grad_shape,
                        &mut other_grad.borrow_mut(),
                    );
                }),
            )
        } else {
            result
        }
    }

    /// Element-wise addition
    #[instrument(skip(self, other), fields(shape = ?self.shape))]
    pub fn add(&self, other: &Tensor) -> Tensor {
        let data = self.zip_map(other, |a, b| a + b);

        self.binary_op(
            other,
            data,
            "add_backward",
            |grad_output, self_grad, other_grad| {
                let _span = tracing::info_span!("AddBackward").entered();
                for i in 0..grad_output.len() {
                    self_grad[i] += grad_output[i];
                    other_grad[i] += grad_output[i];
                }
            },
        )
    }

    /// Element-wise subtraction
    #[instrument(skip(self, other), fields(shape = ?self.shape))]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        let data = self.zip_map(other, |a, b| a - b);

        self.binary_op(
            other,
            data,
            "sub_backward",
            |grad_output, self_grad, other_grad| {
                let _span = tracing::info_span!("SubBackward").entered();
                for i in 0..grad_output.len() {
                    self_grad[i] += grad_output[i];
                    other_grad[i] -= grad_output[i];
                }
            },
        )
    }

    /// Element-wise multiplication
    #[instrument(skip(self, other), fields(shape = ?self.shape))]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        let data = self.zip_map(other, |a, b| a * b);

        let self_data = self.to_vec();
        let other_data = other.to_vec();

        self.binary_op(
            other,
            data,
            "mul_backward",
            move |grad_output, self_grad, other_grad| {
                let _span = tracing::info_span!("EltwiseMulBackward").entered();
                for i in 0..grad_output.len() {
                    self_grad[i] += grad_output[i] * other_data[i]; // d/dx(x*y) = y
                    other_grad[i] += grad_output[i] * self_data[i]; // d/dy(x*y) = x
                }
            },
        )
    }

    /// Scalar multiplication
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let data = self.map(|x| x * scalar);

        self.unary_op(data, "mul_scalar_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("ScalarMulBackward").entered();
            for (g, go) in self_grad.iter_mut().zip(grad_output) {
                *g += go * scalar;
            }
        })
    }

    /// Scalar addition
    pub fn add_scalar(&self, scalar: f32) -> Tensor {
        let data = self.map(|x| x + scalar);

        self.unary_op(data, "add_scalar_backward", |grad_output, self_grad| {
            let _span = tracing::info_span!("ScalarAddBackward").entered();
            for (g, go) in self_grad.iter_mut().zip(grad_output) {
                *g += go;
            }
        })
    }

    /// Element-wise power
    ///
    /// Gradient: d/dx(x^n) = n * x^(n-1)
    #[instrument(skip(self), fields(shape = ?self.shape, exponent = exponent))]
    pub fn pow(&self, exponent: f32) -> Tensor {
        let data = self.map(|x| x.powf(exponent));
        let input_data = self.to_vec();

        self.unary_op(data, "pow_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("PowBackward").entered();
            for i in 0..grad_output.len() {
                self_grad[i] += grad_output[i] * exponent * input_data[i].powf(exponent - 1.0);
            }
        })
    }

    /// Element-wise absolute value
    ///
    /// Gradient: sign(x), taken as 0 at x = 0
    #[instrument(skip(self), fields(shape = ?self.shape))]
    pub fn abs(&self) -> Tensor {
        let data = self.map(f32::abs);
        let sign: Vec<f32> = self.map(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        });

        self.unary_op(data, "abs_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("AbsBackward").entered();
            for i in 0..grad_output.len() {
                self_grad[i] += grad_output[i] * sign[i];
            }
        })
    }

    /// Hyperbolic tangent
    ///
    /// Gradient: 1 - tanh(x)^2
    #[instrument(skip(self), fields(shape = ?self.shape, numel = self.numel))]
    pub fn tanh(&self) -> Tensor {
        let data = self.map(f32::tanh);
        let result_data = data.clone();

        self.unary_op(data, "tanh_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("TanhBackward").entered();
            for i in 0..grad_output.len() {
                self_grad[i] += grad_output[i] * (1.0 - result_data[i] * result_data[i]);
            }
        })
    }

    /// Sigmoid activation: 1 / (1 + e^-x)
    #[instrument(skip(self), fields(shape = ?self.shape, numel = self.numel))]
    pub fn sigmoid(&self) -> Tensor {
        let data = self.map(|x| 1.0 / (1.0 + (-x).exp()));
        let result_data = data.clone();

        self.unary_op(data, "sigmoid_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("SigmoidBackward").entered();
            self_grad
                .iter_mut()
                .zip(grad_output.iter())
                .zip(result_data.iter())
                .for_each(|((g, go), s)| {
                    *g += s * (1.0 - s) * go;
                });
        })
    }

    /// ReLU activation: max(0, x)
    #[instrument(skip(self), fields(shape = ?self.shape, numel = self.numel))]
    pub fn relu(&self) -> Tensor {
        let data = self.map(|x| x.max(0.0));
        let input_data = self.to_vec();

        self.unary_op(data, "relu_backward", move |grad_output, self_grad| {
            let _span = tracing::info_span!("ReLUBackward").entered();
            for i in 0..grad_output.len() {
                if input_data[i] > 0.0 {
                    self_grad[i] += grad_output[i];
                }
            }
        })
    }

    /// Broadcast addition (2D only)
    ///
    /// - If shapes are identical [M, N] + [M, N], performs element-wise addition
    /// - If `other` has shape [1, N] and `self` has shape [M, N], broadcasts `other` across all M rows
    #[instrument(skip(self, other), fields(shape_a = ?self.shape, shape_b = ?other.shape))]
    pub fn broadcast_add(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "broadcast_add only supports 2D tensors"
        );
        assert_eq!(self.shape[1], other.shape[1], "Column dimensions must match");

        let rows = self.shape[0];
        let cols = self.shape[1];
        let is_broadcast = other.shape[0] == 1;

        if !is_broadcast && self.shape[0] != other.shape[0] {
            panic!(
                "Incompatible shapes for broadcast_add: {:?} and {:?}",
                self.shape, other.shape
            );
        }

        let data = {
            let a = self.data.borrow();
            let b = other.data.borrow();
            (0..self.numel)
                .map(|idx| {
                    let j = if is_broadcast { idx % cols } else { idx };
                    a[idx] + b[j]
                })
                .collect()
        };
        let result = Tensor::new(data, self.shape.clone());

        if self.requires_grad || other.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let other_grad = Rc::clone(&other.grad);
            let result_grad = Rc::clone(&result.grad);

            assert!(
                !Rc::ptr_eq(&self_grad, &other_grad),
                "Self-broadcast_add (x.broadcast_add(&x)) is not supported"
            );

            Self::with_grad(
                result,
                vec![self, other],
                "broadcast_add_backward",
                Box::new(move || {
                    let _span = tracing::info_span!("BroadcastAddBackward").entered();
                    let grad_output = result_grad.borrow();
                    let mut self_g = self_grad.borrow_mut();
                    let mut other_g = other_grad.borrow_mut();

                    for i in 0..grad_output.len() {
                        self_g[i] += grad_output[i];
                    }

                    if is_broadcast {
                        // Sum across the broadcast rows
                        for j in 0..cols {
                            other_g[j] += (0..rows).map(|i| grad_output[i * cols + j]).sum::<f32>();
                        }
                    } else {
                        for i in 0..grad_output.len() {
                            other_g[i] += grad_output[i];
                        }
                    }
                }),
            )
        } else {
            result
        }
    }

    /// Sum all elements into a shape-[1] tensor
    #[instrument(skip(self), fields(shape = ?self.shape))]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data.borrow().iter().sum();
        let result = Tensor::scalar(total);

        if self.requires_grad {
            let self_grad = Rc::clone(&self.grad);
            let result_grad = Rc::clone(&result.grad);

            Self::with_grad(
                result,
                vec![self],
                "sum_backward",
                Box::new(move || {
                    let _span = tracing::info_span!("SumBackward").entered();
                    let grad_output = result_grad.borrow()[0];
                    for g in self_grad.borrow_mut().iter_mut() {
                        *g += grad_output;
                    }
                }),
            )
        } else {
            result
        }
    }

    /// Mean of all elements as a shape-[1] tensor
    #[instrument(skip(self), fields(shape = ?self.shape))]
    pub fn mean(&self) -> Tensor {
        self.sum().mul_scalar(1.0 / self.numel as f32)
    }

    /// Backward pass - propagate gradients
    #[instrument(skip(self), fields(shape = ?self.shape))]
    pub fn backward(&self) {
        // Seed d(self)/d(self) = 1.0 (assuming scalar output)
        self.grad.borrow_mut().fill(1.0);

        let root = match &self.graph_node {
            Some(node) => Rc::clone(node),
            None => return,
        };

        let mut topo: Vec<Rc<GraphNode>> = Vec::new();
        let mut visited = HashSet::new();

        fn build_topo(
            v: &Rc<GraphNode>,
            visited: &mut HashSet<*const GraphNode>,
            topo: &mut Vec<Rc<GraphNode>>,
        ) {
            if visited.insert(Rc::as_ptr(v)) {
                for child in &v.prev {
                    build_topo(child, visited, topo);
                }
                topo.push(Rc::clone(v));
            }
        }

        build_topo(&root, &mut visited, &mut topo);

        for node in topo.iter().rev() {
            tracing::trace!(op = node.name, "running backward");
            (node.backward_fn)();
        }
    }
}
