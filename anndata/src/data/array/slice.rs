use anyhow::{bail, Result};
use itertools::Itertools;
use ndarray::Slice;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::ops::{Index, IndexMut, Range, RangeFrom, RangeFull};

use crate::error::AnnDataError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape(SmallVec<[usize; 3]>);

impl Shape {
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Number of elements, or `None` if it overflows `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &x| acc.checked_mul(x))
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0.into_vec()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().map(|x| x.to_string()).join(" x "))
    }
}

impl AsRef<[usize]> for Shape {
    fn as_ref(&self) -> &[usize] {
        &self.0
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Shape {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(shape: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(shape))
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.into_vec()
    }
}

impl From<&[usize]> for Shape {
    fn from(shape: &[usize]) -> Self {
        Self(SmallVec::from_slice(shape))
    }
}

impl From<usize> for Shape {
    fn from(shape: usize) -> Self {
        Self(smallvec![shape])
    }
}

impl FromIterator<usize> for Shape {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self(SmallVec::from_iter(iter))
    }
}

/// A selection along one axis, used for reading and writing to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectInfoElem {
    Index(Vec<usize>),
    Slice(Slice),
}

impl AsRef<SelectInfoElem> for SelectInfoElem {
    fn as_ref(&self) -> &SelectInfoElem {
        self
    }
}

impl From<Slice> for SelectInfoElem {
    fn from(slice: Slice) -> Self {
        Self::Slice(slice)
    }
}

impl From<Range<usize>> for SelectInfoElem {
    fn from(range: Range<usize>) -> Self {
        Self::Slice(range.into())
    }
}

impl From<RangeFrom<usize>> for SelectInfoElem {
    fn from(range: RangeFrom<usize>) -> Self {
        Self::Slice(range.into())
    }
}

impl From<RangeFull> for SelectInfoElem {
    fn from(_: RangeFull) -> Self {
        Self::full()
    }
}

impl From<Vec<usize>> for SelectInfoElem {
    fn from(indices: Vec<usize>) -> Self {
        Self::Index(indices)
    }
}

impl From<&[usize]> for SelectInfoElem {
    fn from(indices: &[usize]) -> Self {
        Self::Index(indices.to_vec())
    }
}

impl SelectInfoElem {
    pub fn full() -> Self {
        Self::Slice(Slice::new(0, None, 1))
    }

    pub fn is_full(&self) -> bool {
        matches!(
            self,
            SelectInfoElem::Slice(Slice {
                start: 0,
                end: None,
                step: 1
            })
        )
    }

    pub fn is_index(&self) -> bool {
        matches!(self, SelectInfoElem::Index(_))
    }

    /// A selection over `ndim` axes that applies `self` to `axis` and `fill`
    /// to every other axis.
    pub fn set_axis(&self, axis: usize, ndim: usize, fill: &SelectInfoElem) -> Vec<SelectInfoElem> {
        (0..ndim)
            .map(|i| if i == axis { self.clone() } else { fill.clone() })
            .collect()
    }
}

/// Slice resolved against a concrete axis length: `start <= end <= len`.
/// A negative step walks backwards from `end - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBounds {
    pub start: usize,
    pub end: usize,
    pub step: isize,
}

impl SliceBounds {
    pub fn new(slice: &Slice, len: usize) -> Self {
        let resolve = |i: isize| -> usize {
            if i < 0 {
                (len as isize + i).max(0) as usize
            } else {
                (i as usize).min(len)
            }
        };
        let start = resolve(slice.start);
        let end = slice.end.map(resolve).unwrap_or(len).max(start);
        let step = if slice.step == 0 { 1 } else { slice.step };
        Self { start, end, step }
    }

    pub fn len(&self) -> usize {
        let step = self.step.unsigned_abs();
        (self.end - self.start + step - 1) / step
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + Clone {
        let Self { start, end, step } = *self;
        let abs = step.unsigned_abs();
        (0..self.len()).map(move |i| {
            if step > 0 {
                start + i * abs
            } else {
                end - 1 - i * abs
            }
        })
    }
}

/// A `SelectInfoElem` resolved against an axis length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectInfoElemBounds {
    Slice(SliceBounds),
    Index(Vec<usize>),
}

impl SelectInfoElemBounds {
    pub fn new(elem: &SelectInfoElem, len: usize) -> Self {
        match elem {
            SelectInfoElem::Slice(slice) => Self::Slice(SliceBounds::new(slice, len)),
            SelectInfoElem::Index(idx) => Self::Index(idx.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Slice(s) => s.len(),
            Self::Index(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self, len: usize) -> bool {
        match self {
            Self::Slice(s) => s.start == 0 && s.end == len && s.step == 1,
            Self::Index(idx) => idx.len() == len && idx.iter().enumerate().all(|(i, &j)| i == j),
        }
    }

    /// The contiguous range this selection covers, if it is a unit-step slice.
    pub fn as_range(&self) -> Option<Range<usize>> {
        match self {
            Self::Slice(SliceBounds { start, end, step: 1 }) => Some(*start..*end),
            _ => None,
        }
    }

    pub fn to_vec(&self) -> Vec<usize> {
        match self {
            Self::Slice(s) => s.iter().collect(),
            Self::Index(idx) => idx.clone(),
        }
    }

    pub fn bound_check(&self, len: usize) -> Result<()> {
        if let Self::Index(idx) = self {
            if let Some(i) = idx.iter().find(|&&i| i >= len) {
                bail!("index {} is out of bounds for axis with length {}", i, len);
            }
        }
        Ok(())
    }
}

/// A full selection resolved against a shape.
#[derive(Debug, Clone)]
pub struct SelectInfoBounds {
    in_shape: Shape,
    bounds: Vec<SelectInfoElemBounds>,
}

impl SelectInfoBounds {
    pub fn new<S: AsRef<SelectInfoElem>>(select: &[S], shape: &Shape) -> Result<Self> {
        if select.len() != shape.ndim() {
            bail!(AnnDataError::axis_mismatch(
                "selection",
                shape.ndim(),
                select.len()
            ));
        }
        let bounds = select
            .iter()
            .zip(shape.as_ref())
            .map(|(s, &n)| {
                let b = SelectInfoElemBounds::new(s.as_ref(), n);
                b.bound_check(n)?;
                Ok(b)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            in_shape: shape.clone(),
            bounds,
        })
    }

    pub fn ndim(&self) -> usize {
        self.bounds.len()
    }

    pub fn in_shape(&self) -> &Shape {
        &self.in_shape
    }

    pub fn out_shape(&self) -> Shape {
        self.bounds.iter().map(|b| b.len()).collect()
    }

    pub fn is_full(&self) -> bool {
        self.bounds
            .iter()
            .zip(self.in_shape.as_ref())
            .all(|(b, &n)| b.is_full(n))
    }
}

impl AsRef<[SelectInfoElemBounds]> for SelectInfoBounds {
    fn as_ref(&self) -> &[SelectInfoElemBounds] {
        &self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_bounds_resolve_negative_and_open_ends() {
        let s = SliceBounds::new(&Slice::new(-3, None, 1), 10);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![7, 8, 9]);

        let s = SliceBounds::new(&Slice::new(2, Some(9), 3), 10);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![2, 5, 8]);
        assert_eq!(s.len(), 3);

        let s = SliceBounds::new(&Slice::new(0, Some(5), -2), 10);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![4, 2, 0]);

        let s = SliceBounds::new(&Slice::new(6, Some(2), 1), 10);
        assert!(s.is_empty());
    }

    #[test]
    fn full_selection() {
        let full = SelectInfoElem::full();
        assert!(full.is_full());
        assert!(SelectInfoElemBounds::new(&full, 4).is_full(4));
        assert!(SelectInfoElemBounds::new(&vec![0, 1, 2].into(), 3).is_full(3));
        assert!(!SelectInfoElemBounds::new(&(1..3).into(), 3).is_full(3));
    }

    #[test]
    fn out_of_bound_index_is_rejected() {
        let shape: Shape = vec![3, 4].into();
        let select: [SelectInfoElem; 2] = [vec![0, 3].into(), (..).into()];
        assert!(SelectInfoBounds::new(&select, &shape).is_err());

        let select: [SelectInfoElem; 2] = [vec![2, 0].into(), (1..).into()];
        let bounds = SelectInfoBounds::new(&select, &shape).unwrap();
        assert_eq!(bounds.out_shape(), vec![2, 3].into());
    }
}
