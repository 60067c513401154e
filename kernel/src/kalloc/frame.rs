//! Per-CPU physical-page allocator with inter-CPU stealing and a dense
//! per-frame reference-count table, grounded on the COW-lab `kalloc.c`
//! (`kmem_collection`/`borrow_mem`) design: frames live on one of `NCPU`
//! freelists; a CPU that runs dry steals half of another CPU's list rather
//! than sharing one global list and its contention.
//!
//! A frame's first bytes double as the freelist link while it is free —
//! there is no separate freelist-node allocation.

use core::{
    ptr,
    sync::atomic::{AtomicU8, Ordering},
};

use array_macro::array;

use crate::{
    cpu::CpuTable,
    param::{KERNBASE, KERNEL_HEAP_SIZE, NCPU, PAGESIZE, PHYSTOP},
    spinlock::SpinLock,
};

const MAX_FRAMES: usize = (PHYSTOP - KERNBASE) / PAGESIZE;

/// one byte per managed frame. `refcount == 0` iff the frame sits on
/// exactly one per-CPU freelist; `refcount >= 1` iff it is mapped
/// somewhere. Sized for the whole [KERNBASE, PHYSTOP) range rather than
/// placed at a runtime-computed offset after the linker's `end` symbol, so
/// it can live as an ordinary static in kernel .bss.
static REFCOUNTS: [AtomicU8; MAX_FRAMES] = array![_ => AtomicU8::new(0); MAX_FRAMES];

struct FreeNode {
    next: *mut FreeNode,
}

struct FreeList {
    head: *mut FreeNode,
    page_count: usize,
}

unsafe impl Send for FreeList {}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            page_count: 0,
        }
    }

    unsafe fn push(&mut self, pa: usize) {
        let node = pa as *mut FreeNode;
        (*node).next = self.head;
        self.head = node;
        self.page_count += 1;
    }

    unsafe fn pop(&mut self) -> Option<usize> {
        let node = self.head;
        if node.is_null() {
            return None;
        }
        self.head = (*node).next;
        self.page_count -= 1;
        Some(node as usize)
    }
}

struct FrameAllocator {
    lists: [SpinLock<FreeList>; NCPU],
    // doubles as the global allocator lock: holding it for the whole of
    // `steal` serializes stealers, so no two CPUs ever hold two peer locks
    // in conflicting order.
    cursor: SpinLock<usize>,
}

static FRAME_ALLOCATOR: FrameAllocator = FrameAllocator {
    lists: array![_ => SpinLock::new(FreeList::new(), "frame_freelist"); NCPU],
    cursor: SpinLock::new(0, "frame_cursor"),
};

impl FrameAllocator {
    /// moves half of some donor CPU's free frames onto `target`'s list.
    /// returns the number of frames moved; 0 if no other CPU has more than
    /// one free frame after a full cycle.
    fn steal(&self, target: usize) -> usize {
        let mut cursor = self.cursor.lock();

        for _ in 0..NCPU {
            let donor = *cursor;
            *cursor = (*cursor + 1) % NCPU;

            if donor == target {
                continue;
            }

            let mut donor_list = self.lists[donor].lock();
            if donor_list.page_count <= 1 {
                continue;
            }

            let n = donor_list.page_count / 2;
            let mut target_list = self.lists[target].lock();
            for _ in 0..n {
                let pa = unsafe { donor_list.pop() }.expect("steal: page_count desynced");
                unsafe { target_list.push(pa) };
            }
            return n;
        }

        0
    }
}

#[inline]
fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
fn frame_index(pa: usize) -> usize {
    (pa - KERNBASE) / PAGESIZE
}

fn check_managed(pa: usize) {
    if pa % PAGESIZE != 0 || pa < KERNBASE || pa >= PHYSTOP {
        panic!("frame: {:#x} is not a managed frame", pa);
    }
}

/// seeds the refcount table to 1 for every frame in the pool and sweeps
/// them through `free`, which drives each down to 0 and pushes it onto the
/// current (boot) CPU's freelist. Must run on a single hart, before paging
/// is enabled and before any other hart calls `alloc`.
pub fn init() {
    extern "C" {
        fn end();
    }
    let pool_start = align_up(end as usize + KERNEL_HEAP_SIZE, PAGESIZE);

    let mut pa = pool_start;
    while pa < PHYSTOP {
        REFCOUNTS[frame_index(pa)].store(1, Ordering::Relaxed);
        pa += PAGESIZE;
    }

    let mut pa = pool_start;
    while pa < PHYSTOP {
        free(pa);
        pa += PAGESIZE;
    }
}

/// returns an exclusively-owned, zero-filled (well, `0x05`-filled) 4 KiB
/// frame with `refcount` set to 1. `None` when no CPU has a free frame,
/// even after stealing.
pub fn alloc() -> Option<usize> {
    let cpu = CpuTable::cpu_id();

    loop {
        {
            let mut list = FRAME_ALLOCATOR.lists[cpu].lock();
            if let Some(pa) = unsafe { list.pop() } {
                drop(list);
                let idx = frame_index(pa);
                if REFCOUNTS[idx].swap(1, Ordering::AcqRel) != 0 {
                    panic!("frame::alloc: frame {:#x} was free with refcount != 0", pa);
                }
                unsafe { ptr::write_bytes(pa as *mut u8, 0x05, PAGESIZE) };
                return Some(pa);
            }
        }

        if FRAME_ALLOCATOR.steal(cpu) == 0 {
            return None;
        }
    }
}

/// decrements `refcount`. If it reaches zero, poisons the frame and pushes
/// it onto the calling CPU's freelist. Calling `free` on a frame whose
/// refcount is already zero is a fatal invariant violation.
pub fn free(pa: usize) {
    check_managed(pa);
    let idx = frame_index(pa);

    let prev = REFCOUNTS[idx]
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
            if c == 0 {
                None
            } else {
                Some(c - 1)
            }
        })
        .unwrap_or_else(|_| panic!("frame::free: {:#x} already has refcount 0", pa));

    if prev == 1 {
        unsafe { ptr::write_bytes(pa as *mut u8, 0x01, PAGESIZE) };
        let cpu = CpuTable::cpu_id();
        let mut list = FRAME_ALLOCATOR.lists[cpu].lock();
        unsafe { list.push(pa) };
    }
}

/// atomically bumps the refcount without touching any freelist.
pub fn incref(pa: usize) {
    check_managed(pa);
    let prev = REFCOUNTS[frame_index(pa)].fetch_add(1, Ordering::AcqRel);
    if prev == u8::MAX {
        panic!("frame::incref: {:#x} refcount overflow", pa);
    }
}

/// atomically lowers the refcount without touching any freelist. Must
/// never be the call that brings a frame to zero — use `free` for that.
pub fn decref(pa: usize) {
    check_managed(pa);
    let prev = REFCOUNTS[frame_index(pa)].fetch_sub(1, Ordering::AcqRel);
    if prev <= 1 {
        panic!("frame::decref: {:#x} must be released via free(), not decref()", pa);
    }
}

pub fn refcount(pa: usize) -> u8 {
    check_managed(pa);
    REFCOUNTS[frame_index(pa)].load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_free_roundtrip() {
        let pa = alloc().expect("alloc");
        assert_eq!(1, refcount(pa));
        free(pa);
    }

    #[test_case]
    fn alloc_is_filled() {
        let pa = alloc().expect("alloc");
        let bytes = unsafe { core::slice::from_raw_parts(pa as *const u8, 16) };
        assert!(bytes.iter().all(|&b| b == 0x05));
        free(pa);
    }

    #[test_case]
    fn incref_keeps_frame_alive() {
        let pa = alloc().expect("alloc");
        incref(pa);
        assert_eq!(2, refcount(pa));
        free(pa);
        assert_eq!(1, refcount(pa));
        free(pa);
    }
}
