//! Lock-free Single-Producer Single-Consumer Ring Buffer
//!
//! 设计目标：
//! - 零锁：生产者和消费者完全无锁操作
//! - 零分配：所有内存在初始化时预分配
//! - 缓存友好：读写位置各占一个 cache line（`CachePadded`）
//!
//! 用于解码线程（生产者）和 JACK process 回调（消费者）之间的字节传递。
//! 消费者侧的操作（`read` / `discard` / `clear`）只能在同一个线程调用。

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::memory;

/// SPSC 无锁环形缓冲区
pub struct RingBuffer<T: Copy + Default> {
    buffer: Box<[UnsafeCell<T>]>,
    capacity: usize,
    mask: usize,

    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,

    memory_locked: AtomicBool,
}

unsafe impl<T: Copy + Default + Send> Send for RingBuffer<T> {}
unsafe impl<T: Copy + Default + Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// 创建指定容量的 Ring Buffer
    ///
    /// capacity 必须是 2 的幂
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be power of two");

        let buffer: Vec<UnsafeCell<T>> = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect();

        Self {
            buffer: buffer.into_boxed_slice(),
            capacity,
            mask: capacity - 1,
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            memory_locked: AtomicBool::new(false),
        }
    }

    /// 锁定缓冲区内存，防止被换页
    pub fn lock_memory(&self) -> bool {
        if self.memory_locked.load(Ordering::Acquire) {
            return true;
        }

        if memory::lock_slice(&self.buffer[..]) {
            self.memory_locked.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// 解锁缓冲区内存
    pub fn unlock_memory(&self) {
        if self.memory_locked.swap(false, Ordering::AcqRel) {
            memory::unlock_slice(&self.buffer[..]);
        }
    }

    /// 写入样本（生产者调用）
    ///
    /// 返回实际写入的数量，wait-free
    #[inline]
    pub fn write(&self, data: &[T]) -> usize {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        let used = write.wrapping_sub(read);
        debug_assert!(used <= self.capacity, "ring buffer invariant violated: used > capacity");

        let free = self.capacity - used;
        let to_write = data.len().min(free);

        for (i, &item) in data[..to_write].iter().enumerate() {
            let idx = (write + i) & self.mask;
            unsafe {
                *self.buffer[idx].get() = item;
            }
        }

        self.write_pos.store(write.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// 读取样本（消费者调用）
    ///
    /// 返回实际读取的数量，wait-free
    #[inline]
    pub fn read(&self, output: &mut [T]) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);

        let available = write.wrapping_sub(read);
        let to_read = output.len().min(available);

        for (i, slot) in output[..to_read].iter_mut().enumerate() {
            let idx = (read + i) & self.mask;
            *slot = unsafe { *self.buffer[idx].get() };
        }

        self.read_pos.store(read.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// 丢弃最多 `count` 个元素（消费者调用）
    ///
    /// 返回实际丢弃的数量
    #[inline]
    pub fn discard(&self, count: usize) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);

        let to_skip = count.min(write.wrapping_sub(read));
        self.read_pos.store(read.wrapping_add(to_skip), Ordering::Release);
        to_skip
    }

    /// 当前可读数量
    #[inline]
    pub fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// 当前可写空间
    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity - self.available()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 填充比例（用于监控）
    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.available() as f64 / self.capacity as f64
    }

    /// 清空缓冲区（消费者调用，或在消费者停止时调用）
    pub fn clear(&self) {
        let write = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write, Ordering::Release);
    }
}

impl<T: Copy + Default> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        self.unlock_memory();
    }
}
