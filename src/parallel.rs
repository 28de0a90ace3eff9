use rayon::prelude::*;
use std::ops::AddAssign;

///Below this size a bulk pass runs sequentially; the rayon fork/join overhead
///only pays for itself on larger ranges.
const K_SEQ_THRESHOLD: usize = 1 << 13;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum ExecutionPolicy {
	Seq,
	Par,
}

#[inline]
pub fn auto_policy(size: usize) -> ExecutionPolicy {
	if size < K_SEQ_THRESHOLD {
		ExecutionPolicy::Seq
	} else {
		ExecutionPolicy::Par
	}
}

///Run `f` once per element of the pre-sized output slice. Each invocation owns
///exactly its output slot; `f` must not touch any other shared mutable state.
pub fn for_each_mut<T, F>(policy: ExecutionPolicy, out: &mut [T], f: F)
where
	T: Send,
	F: Fn(usize, &mut T) + Send + Sync,
{
	match policy {
		ExecutionPolicy::Seq => out.iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
		ExecutionPolicy::Par => out.par_iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
	}
}

///Produce a vector of `n` elements by evaluating the pure function `f` at each
///index.
pub fn transform_n<T, F>(policy: ExecutionPolicy, n: usize, f: F) -> Vec<T>
where
	T: Send,
	F: Fn(usize) -> T + Send + Sync,
{
	match policy {
		ExecutionPolicy::Seq => (0..n).map(f).collect(),
		ExecutionPolicy::Par => (0..n).into_par_iter().map(f).collect(),
	}
}

///Compute the exclusive prefix sum of `input` into `output` starting from
///`init`. The output slice must already be sized to the input length. Scans
///are ordered and always run sequentially.
pub fn exclusive_scan_iter<IO>(input: impl Iterator<Item = IO>, output: &mut [IO], init: IO)
where
	IO: Copy + AddAssign,
{
	let mut acc = init;
	for (slot, val) in output.iter_mut().zip(input) {
		*slot = acc;
		acc += val;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exclusive_scan_offsets() {
		let added = [2, 0, 3, 1];
		let mut offsets = [0; 4];
		exclusive_scan_iter(added.iter().copied(), &mut offsets, 10);
		assert_eq!(offsets, [10, 12, 12, 15]);
	}

	#[test]
	fn for_each_mut_fills_every_slot() {
		let mut out = vec![0usize; 100];
		for_each_mut(ExecutionPolicy::Par, &mut out, |i, v| *v = i * i);
		assert!(out.iter().enumerate().all(|(i, &v)| v == i * i));
	}
}
