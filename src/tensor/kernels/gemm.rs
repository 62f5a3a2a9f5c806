/// General Matrix Multiply (GEMM) on row-major buffers
///
/// Computes: C += alpha * op(A) @ op(B)
/// where op(X) is either X or X^T depending on the transpose flag.
/// Shapes are given for the stored (untransposed) matrices.
struct GemmParams<'a> {
    a_data: &'a [f32],
    a_shape: [usize; 2],
    transpose_left: bool,
    b_data: &'a [f32],
    b_shape: [usize; 2],
    transpose_right: bool,
    c_data: &'a mut [f32],
    alpha: f32,
}

fn gemm(params: GemmParams) {
    let GemmParams {
        a_data,
        a_shape,
        transpose_left,
        b_data,
        b_shape,
        transpose_right,
        c_data,
        alpha,
    } = params;

    let (m, k) = if transpose_left {
        (a_shape[1], a_shape[0])
    } else {
        (a_shape[0], a_shape[1])
    };
    let (k_b, n) = if transpose_right {
        (b_shape[1], b_shape[0])
    } else {
        (b_shape[0], b_shape[1])
    };
    assert_eq!(
        k, k_b,
        "Incompatible dimensions: op(A) has {} columns but op(B) has {} rows",
        k, k_b
    );
    assert_eq!(c_data.len(), m * n, "Output buffer size mismatch");

    // (row stride, col stride) of op(X) inside X's row-major buffer
    let (a_rs, a_cs) = if transpose_left { (1, a_shape[1]) } else { (a_shape[1], 1) };
    let (b_rs, b_cs) = if transpose_right { (1, b_shape[1]) } else { (b_shape[1], 1) };

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for p in 0..k {
                sum += a_data[i * a_rs + p * a_cs] * b_data[p * b_rs + j * b_cs];
            }
            c_data[i * n + j] += alpha * sum;
        }
    }
}

fn as_matrix(shape: &[usize], name: &str) -> [usize; 2] {
    assert_eq!(shape.len(), 2, "Matrix {} must be 2D", name);
    [shape[0], shape[1]]
}

/// Performs matrix multiplication: C = A @ B
///
/// # Panics
/// * If either input is not 2D or `a_shape[1] != b_shape[0]`
pub fn matmul(a_data: &[f32], a_shape: &[usize], b_data: &[f32], b_shape: &[usize]) -> Vec<f32> {
    let a_shape = as_matrix(a_shape, "A");
    let b_shape = as_matrix(b_shape, "B");
    let mut result = vec![0.0; a_shape[0] * b_shape[1]];

    gemm(GemmParams {
        a_data,
        a_shape,
        transpose_left: false,
        b_data,
        b_shape,
        transpose_right: false,
        c_data: &mut result,
        alpha: 1.0,
    });

    result
}

/// Accumulates dL/dA = grad_output @ B^T into `a_grad`
pub fn matmul_backward_left(
    grad_output: &[f32],
    grad_shape: &[usize],
    b_data: &[f32],
    b_shape: &[usize],
    a_grad: &mut [f32],
) {
    gemm(GemmParams {
        a_data: grad_output,
        a_shape: as_matrix(grad_shape, "dC"),
        transpose_left: false,
        b_data,
        b_shape: as_matrix(b_shape, "B"),
        transpose_right: true,
        c_data: a_grad,
        alpha: 1.0,
    });
}

/// Accumulates dL/dB = A^T @ grad_output into `b_grad`
pub fn matmul_backward_right(
    a_data: &[f32],
    a_shape: &[usize],
    grad_output: &[f32],
    grad_shape: &[usize],
    b_grad: &mut [f32],
) {
    gemm(GemmParams {
        a_data,
        a_shape: as_matrix(a_shape, "A"),
        transpose_left: true,
        b_data: grad_output,
        b_shape: as_matrix(grad_shape, "dC"),
        transpose_right: false,
        c_data: b_grad,
        alpha: 1.0,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_rectangular() {
        // [2x3] @ [3x2]
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let result = matmul(&a, &[2, 3], &b, &[3, 2]);
        assert_eq!(result, vec![22.0, 28.0, 49.0, 64.0]);
    }

    #[test]
    #[should_panic(expected = "Incompatible dimensions")]
    fn test_matmul_incompatible() {
        matmul(&[1.0, 2.0], &[1, 2], &[1.0, 2.0, 3.0], &[3, 1]);
    }

    #[test]
    fn test_matmul_backward_accumulates() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![2.0, 0.0, 0.0, 2.0];
        let grad_output = vec![1.0, 1.0, 1.0, 1.0];

        // Pre-filled buffers: backward adds into them
        let mut a_grad = vec![1.0; 4];
        matmul_backward_left(&grad_output, &[2, 2], &b, &[2, 2], &mut a_grad);
        assert_eq!(a_grad, vec![3.0, 3.0, 3.0, 3.0]);

        let mut b_grad = vec![0.0; 4];
        matmul_backward_right(&a, &[2, 2], &grad_output, &[2, 2], &mut b_grad);
        // A^T @ 1 = [[1,3],[2,4]] @ [[1,1],[1,1]]
        assert_eq!(b_grad, vec![4.0, 4.0, 6.0, 6.0]);
    }

    #[test]
    fn test_matmul_backward_left_rectangular() {
        // C = A[2x3] @ B[3x1], dC = ones[2x1] -> dA = dC @ B^T, each row equals B^T
        let b = vec![1.0, 2.0, 3.0];
        let mut a_grad = vec![0.0; 6];
        matmul_backward_left(&[1.0, 1.0], &[2, 1], &b, &[3, 1], &mut a_grad);
        assert_eq!(a_grad, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    }
}
