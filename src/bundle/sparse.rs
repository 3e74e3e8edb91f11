//! # Block-sparse symmetric matrices and their Cholesky factor
//!
//! The reduced normal matrix is stored by block rows: block `(i, j)` with `j ≥ i` lives in
//! `rows[i][j]`, so only the upper triangle is kept. Block sizes are the free-parameter counts of
//! the observations (and of the target body), zero-sized blocks are allowed and ignored.
//!
//! [`SparseBlockMatrix::factor`] computes `N = Uᵀ U` block row by block row, creating fill-in
//! blocks as needed. The diagonal blocks are factored with a dense Cholesky that reports the first
//! failing pivot, which becomes [`JigsawError::NotPositiveDefinite`].
use std::collections::{btree_map::Entry, BTreeSet};

use nalgebra::{DMatrix, DVector};

use crate::{constants::BlockRow, jigsaw_errors::JigsawError};

/// Pivots smaller than this fraction of the original diagonal entry are treated as zero.
const RELATIVE_PIVOT_FLOOR: f64 = 1.0e-14;

#[derive(Debug, Clone, PartialEq)]
pub struct SparseBlockMatrix {
    sizes: Vec<usize>,
    offsets: Vec<usize>,
    rows: Vec<BlockRow>,
}

impl SparseBlockMatrix {
    pub fn new(sizes: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut acc = 0;
        for s in &sizes {
            offsets.push(acc);
            acc += s;
        }
        let rows = vec![BlockRow::new(); sizes.len()];
        Self {
            sizes,
            offsets,
            rows,
        }
    }

    pub fn block_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn block_size(&self, block: usize) -> usize {
        self.sizes[block]
    }

    pub fn offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    /// Total number of scalar unknowns.
    pub fn dimension(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Accumulate `m` into block `(i, j)`. Blocks below the diagonal are stored transposed.
    pub fn add_block(&mut self, i: usize, j: usize, m: &DMatrix<f64>) {
        if self.sizes[i] == 0 || self.sizes[j] == 0 {
            return;
        }
        let (r, c, m) = if i <= j {
            (i, j, m.clone())
        } else {
            (j, i, m.transpose())
        };
        match self.rows[r].entry(c) {
            Entry::Occupied(mut e) => *e.get_mut() += &m,
            Entry::Vacant(e) => {
                e.insert(m);
            }
        }
    }

    /// Add `value` to the scalar diagonal entry `k` of block `block`.
    pub fn add_diagonal(&mut self, block: usize, k: usize, value: f64) {
        let n = self.sizes[block];
        if n == 0 {
            return;
        }
        let b = self.rows[block]
            .entry(block)
            .or_insert_with(|| DMatrix::zeros(n, n));
        b[(k, k)] += value;
    }

    pub fn block(&self, i: usize, j: usize) -> Option<&DMatrix<f64>> {
        self.rows.get(i).and_then(|r| r.get(&j))
    }

    /// Number of stored upper blocks.
    pub fn stored_blocks(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// Slice of a global vector belonging to `block`.
    pub fn segment(&self, v: &DVector<f64>, block: usize) -> DVector<f64> {
        v.rows(self.offsets[block], self.sizes[block]).into_owned()
    }

    /// Dense copy, used by error propagation checks and tests.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.dimension();
        let mut out = DMatrix::zeros(n, n);
        for (i, row) in self.rows.iter().enumerate() {
            for (&j, b) in row {
                let (oi, oj) = (self.offsets[i], self.offsets[j]);
                out.view_mut((oi, oj), b.shape()).copy_from(b);
                if i != j {
                    out.view_mut((oj, oi), (b.ncols(), b.nrows()))
                        .copy_from(&b.transpose());
                }
            }
        }
        out
    }

    /// Block Cholesky factorisation `N = Uᵀ U`.
    ///
    /// Return
    /// ----------
    /// * The factor, or [`JigsawError::NotPositiveDefinite`] with the failing block and pivot.
    pub fn factor(&self) -> Result<BlockCholesky, JigsawError> {
        let nb = self.block_count();
        let mut u: Vec<BlockRow> = vec![BlockRow::new(); nb];
        let mut col_rows: Vec<Vec<usize>> = vec![Vec::new(); nb];

        for k in 0..nb {
            let nk = self.sizes[k];
            if nk == 0 {
                continue;
            }
            let original = self
                .block(k, k)
                .cloned()
                .unwrap_or_else(|| DMatrix::zeros(nk, nk));
            let mut d = original.clone();
            for &i in &col_rows[k] {
                let uik = &u[i][&k];
                d -= uik.transpose() * uik;
            }
            let l = dense_cholesky(&d, &original).map_err(|pivot| {
                JigsawError::NotPositiveDefinite { block: k, pivot }
            })?;

            let mut targets: BTreeSet<usize> =
                self.rows[k].range(k + 1..).map(|(j, _)| *j).collect();
            for &i in &col_rows[k] {
                targets.extend(u[i].range(k + 1..).map(|(j, _)| *j));
            }

            let mut new_blocks = Vec::with_capacity(targets.len());
            for j in targets {
                if self.sizes[j] == 0 {
                    continue;
                }
                let mut m = self
                    .block(k, j)
                    .cloned()
                    .unwrap_or_else(|| DMatrix::zeros(nk, self.sizes[j]));
                for &i in &col_rows[k] {
                    if let (Some(uik), Some(uij)) = (u[i].get(&k), u[i].get(&j)) {
                        m -= uik.transpose() * uij;
                    }
                }
                let x = l.solve_lower_triangular(&m).ok_or(
                    JigsawError::NotPositiveDefinite {
                        block: k,
                        pivot: 0.0,
                    },
                )?;
                new_blocks.push((j, x));
            }
            for (j, x) in new_blocks {
                u[k].insert(j, x);
                col_rows[j].push(k);
            }
            u[k].insert(k, l.transpose());
        }

        Ok(BlockCholesky {
            sizes: self.sizes.clone(),
            offsets: self.offsets.clone(),
            u,
            col_rows,
        })
    }
}

/// Dense lower Cholesky factor with pivot reporting.
fn dense_cholesky(d: &DMatrix<f64>, original: &DMatrix<f64>) -> Result<DMatrix<f64>, f64> {
    let n = d.nrows();
    let mut l = DMatrix::<f64>::zeros(n, n);
    for j in 0..n {
        let mut pivot = d[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)];
        }
        let floor = RELATIVE_PIVOT_FLOOR * original[(j, j)].abs();
        if !pivot.is_finite() || pivot <= floor || pivot <= 0.0 {
            return Err(pivot);
        }
        let ljj = pivot.sqrt();
        l[(j, j)] = ljj;
        for i in j + 1..n {
            let mut s = d[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / ljj;
        }
    }
    Ok(l)
}

/// Upper block factor `U` of a [`SparseBlockMatrix`].
#[derive(Debug, Clone)]
pub struct BlockCholesky {
    sizes: Vec<usize>,
    offsets: Vec<usize>,
    u: Vec<BlockRow>,
    col_rows: Vec<Vec<usize>>,
}

impl BlockCholesky {
    pub fn dimension(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Solve `Uᵀ U x = b`.
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let nb = self.sizes.len();
        let seg = |v: &DVector<f64>, k: usize| v.rows(self.offsets[k], self.sizes[k]).into_owned();

        let mut y = DVector::zeros(b.len());
        for k in 0..nb {
            if self.sizes[k] == 0 {
                continue;
            }
            let mut r = seg(b, k);
            for &i in &self.col_rows[k] {
                r -= self.u[i][&k].transpose() * seg(&y, i);
            }
            let ukk = &self.u[k][&k];
            let yk = ukk
                .transpose()
                .solve_lower_triangular(&r)
                .unwrap_or_else(|| DVector::zeros(self.sizes[k]));
            y.rows_mut(self.offsets[k], self.sizes[k]).copy_from(&yk);
        }

        let mut x = DVector::zeros(b.len());
        for k in (0..nb).rev() {
            if self.sizes[k] == 0 {
                continue;
            }
            let mut r = seg(&y, k);
            for (&j, ukj) in self.u[k].range(k + 1..) {
                r -= ukj * seg(&x, j);
            }
            let xk = self.u[k][&k]
                .solve_upper_triangular(&r)
                .unwrap_or_else(|| DVector::zeros(self.sizes[k]));
            x.rows_mut(self.offsets[k], self.sizes[k]).copy_from(&xk);
        }
        x
    }

    /// Dense inverse `N⁻¹`, one column at a time.
    pub fn inverse(&self) -> DMatrix<f64> {
        let n = self.dimension();
        let mut out = DMatrix::zeros(n, n);
        for c in 0..n {
            let mut e = DVector::zeros(n);
            e[c] = 1.0;
            out.set_column(c, &self.solve(&e));
        }
        // symmetrise round-off
        (&out + out.transpose()) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_system() -> SparseBlockMatrix {
        // 3 blocks of sizes 2, 0, 3 with a coupling between blocks 0 and 2
        let mut m = SparseBlockMatrix::new(vec![2, 0, 3]);
        m.add_block(0, 0, &DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]));
        m.add_block(
            2,
            2,
            &DMatrix::from_row_slice(3, 3, &[5.0, 1.0, 0.5, 1.0, 4.0, 0.2, 0.5, 0.2, 6.0]),
        );
        m.add_block(2, 0, &DMatrix::from_row_slice(3, 2, &[0.5, 0.1, 0.2, 0.3, 0.0, 0.4]));
        m
    }

    #[test]
    fn test_solve_matches_dense() {
        let m = spd_system();
        let dense = m.to_dense();
        let b = DVector::from_vec(vec![1.0, -2.0, 0.5, 3.0, -1.0]);
        // the zero-sized block stores nothing
        assert_eq!(m.stored_blocks(), 3);
        let x = m.factor().unwrap().solve(&b);
        assert_relative_eq!(&dense * &x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_matches_dense() {
        let m = spd_system();
        let dense = m.to_dense();
        let inv = m.factor().unwrap().inverse();
        assert_relative_eq!(&dense * inv, DMatrix::identity(5, 5), epsilon = 1e-12);
    }

    #[test]
    fn test_fill_in_through_shared_row() {
        // block 0 couples to 1 and 2, which are not directly coupled
        let mut m = SparseBlockMatrix::new(vec![1, 1, 1]);
        m.add_diagonal(0, 0, 4.0);
        m.add_diagonal(1, 0, 3.0);
        m.add_diagonal(2, 0, 5.0);
        m.add_block(0, 1, &DMatrix::from_element(1, 1, 1.0));
        m.add_block(0, 2, &DMatrix::from_element(1, 1, 2.0));
        assert_eq!(m.stored_blocks(), 5);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = m.factor().unwrap().solve(&b);
        assert_relative_eq!(m.to_dense() * x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_reports_block() {
        let mut m = SparseBlockMatrix::new(vec![1, 2]);
        m.add_diagonal(0, 0, 1.0);
        m.add_block(1, 1, &DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]));
        match m.factor() {
            Err(JigsawError::NotPositiveDefinite { block, .. }) => assert_eq!(block, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
