///calls vec.resize() and potentially vec.shrink_to_fit()
pub fn vec_resize<T>(vec: &mut Vec<T>, new_size: usize)
where
	T: Clone + Default,
{
	let shrink = vec.len() > 2 * new_size && vec.len() > 16;
	vec.resize(new_size, T::default());
	if shrink {
		vec.shrink_to_fit();
	}
}

///safety: any new elements added to the vec are uninitialized
pub unsafe fn vec_resize_nofill<T>(vec: &mut Vec<T>, new_size: usize) {
	//no-op
	if new_size == vec.len() {
		return;
	}

	//shrink
	if new_size < vec.len() {
		let shrink = vec.len() > 2 * new_size && vec.len() > 16;
		vec.truncate(new_size);
		if shrink {
			vec.shrink_to_fit();
		}

		return;
	}

	//grow
	vec.reserve(new_size - vec.len());
	unsafe {
		vec.set_len(new_size);
	}
}

///safety: all elements are uninitialized
pub unsafe fn vec_uninit<T>(size: usize) -> Vec<T> {
	let mut vec = Vec::with_capacity(size);
	unsafe {
		vec.set_len(size);
	}
	vec
}
