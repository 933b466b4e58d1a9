//! 内存锁定
//!
//! 实时回调中的 page fault 会直接造成 xrun。
//! 预分配的缓冲区在交给实时线程前用 mlock 锁定在物理内存中。

/// 锁定切片所在的内存页
///
/// 返回是否成功锁定。RLIMIT_MEMLOCK 不足时失败，不影响功能
pub fn lock_slice<T>(data: &[T]) -> bool {
    let len = std::mem::size_of_val(data);
    if len == 0 {
        return true;
    }

    let ptr = data.as_ptr() as *const libc::c_void;
    let result = unsafe { libc::mlock(ptr, len) };

    if result == 0 {
        log::debug!("Memory locked: {} bytes", len);
        true
    } else {
        log::warn!(
            "Failed to lock {} bytes of memory: {}",
            len,
            std::io::Error::last_os_error()
        );
        false
    }
}

/// 解锁切片所在的内存页
pub fn unlock_slice<T>(data: &[T]) {
    let len = std::mem::size_of_val(data);
    if len == 0 {
        return;
    }

    let ptr = data.as_ptr() as *const libc::c_void;
    unsafe {
        libc::munlock(ptr, len);
    }
}
