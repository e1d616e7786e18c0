//! Sparse adjacency for the movie graph.
//!
//! Stored in compressed sparse row form after GCN-style normalization:
//! `D^-1/2 (A + I) D^-1/2`, where `D` is the degree matrix of `A + I`.

use std::collections::BTreeSet;

use ndarray::{Array2, ArrayView1};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    nodes: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl Adjacency {
    /// Builds the normalized adjacency from an undirected edge list.
    /// Duplicate edges and explicit self loops are collapsed.
    pub fn from_edges(nodes: usize, edges: &[(usize, usize)]) -> Result<Self> {
        let mut neighbours: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes];
        for &(a, b) in edges {
            if a >= nodes || b >= nodes {
                return Err(Error::Shape(format!(
                    "edge ({a},{b}) out of range for {nodes} nodes"
                )));
            }
            neighbours[a].insert(b);
            neighbours[b].insert(a);
        }
        //self loops
        for (i, n) in neighbours.iter_mut().enumerate() {
            n.insert(i);
        }

        let inv_sqrt_degree: Vec<f32> = neighbours
            .iter()
            .map(|n| 1. / (n.len() as f32).sqrt())
            .collect();

        let mut indptr = Vec::with_capacity(nodes + 1);
        let mut indices = vec![];
        let mut values = vec![];
        indptr.push(0);
        for (row, cols) in neighbours.iter().enumerate() {
            for &col in cols {
                indices.push(col);
                values.push(inv_sqrt_degree[row] * inv_sqrt_degree[col]);
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            nodes,
            indptr,
            indices,
            values,
        })
    }

    /// Identity adjacency, i.e. a graph with no edges
    pub fn identity(nodes: usize) -> Self {
        Self {
            nodes,
            indptr: (0..=nodes).collect(),
            indices: (0..nodes).collect(),
            values: vec![1.; nodes],
        }
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Number of stored entries, self loops included
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Undirected edges, self loops excluded
    pub fn edge_count(&self) -> usize {
        let off_diagonal = (0..self.nodes)
            .map(|r| self.row(r).filter(|&(c, _)| c != r).count())
            .sum::<usize>();
        off_diagonal / 2
    }

    /// `(column, value)` pairs of one row
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let span = self.indptr[row]..self.indptr[row + 1];
        self.indices[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    /// Sparse * dense product: `self . x`
    pub fn matmul(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.nrows() != self.nodes {
            return Err(Error::Shape(format!(
                "adjacency has {} nodes but matrix has {} rows",
                self.nodes,
                x.nrows()
            )));
        }
        let mut out = Array2::zeros(x.dim());
        for (r, mut out_row) in out.rows_mut().into_iter().enumerate() {
            for (c, v) in self.row(r) {
                let src: ArrayView1<f32> = x.row(c);
                out_row.scaled_add(v, &src);
            }
        }
        Ok(out)
    }

    /// Applies `self` to `x` `steps` times
    pub fn propagate(&self, x: &Array2<f32>, steps: usize) -> Result<Array2<f32>> {
        let mut h = x.clone();
        for _ in 0..steps {
            h = self.matmul(&h)?;
        }
        Ok(h)
    }
}
