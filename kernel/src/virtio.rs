/// driver for qemu's virtio disk device.
/// uses qemu's mmio interface to virtio.
/// qemu presents a "legacy" virtio interface.

const NUM: usize = 8; // this many virtio descriptors. must be a power of two.

use core::{
    mem, ptr,
    sync::atomic::{fence, Ordering},
};

use array_macro::array;

use crate::{
    bio::{BufGuard, BSIZE},
    cpu::CPU_TABLE,
    param::{PAGESIZE, VIRTIO0},
    process::PROCESS_TABLE,
    spinlock::SpinLock,
};

#[repr(C)]
struct Desc {
    addr: usize,
    len: u32,
    flags: u16,
    next: u16,
}

impl Desc {
    const fn new() -> Self {
        Self {
            addr: 0,
            len: 0,
            flags: 0,
            next: 0,
        }
    }
}

#[repr(C)]
struct Avail {
    flags: u16,
    idx: u16,
    ring: [u16; NUM],
    unused: u16,
}

impl Avail {
    const fn new() -> Self {
        Self {
            flags: 0,
            idx: 0,
            ring: [0; NUM],
            unused: 0,
        }
    }
}

#[repr(C)]
struct Used {
    flags: u16,
    idx: u16,
    ring: [UsedElem; NUM],
}

impl Used {
    const fn new() -> Self {
        Self {
            flags: 0,
            idx: 0,
            ring: array![_ => UsedElem::new(); NUM],
        }
    }
}

#[repr(C)]
struct UsedElem {
    id: u32,
    len: u32,
}

impl UsedElem {
    const fn new() -> Self {
        Self { id: 0, len: 0 }
    }
}

/// per-descriptor-chain bookkeeping, indexed by the request's head
/// descriptor: `disk` is true while the device still owns the request,
/// `buf_chan` is the wait channel `rw`'s caller slept on.
#[repr(C)]
struct Info {
    buf_chan: Option<usize>,
    disk: bool,
    status: u8,
}

impl Info {
    const fn new() -> Self {
        Self {
            buf_chan: None,
            disk: false,
            status: 0,
        }
    }
}

#[repr(C)]
struct BlkReq {
    typed: u32,
    reserved: u32,
    sector: usize,
}

impl BlkReq {
    const fn new() -> Self {
        Self {
            typed: 0,
            reserved: 0,
            sector: 0,
        }
    }
}

#[repr(C, align(4096))]
struct PaddedPage {}

#[repr(C)]
#[repr(align(4096))]
pub struct Disk {
    // devided three regions (decriptors, avail, and used).
    // https://docs.oasis-open.org/virtio/virtio/v1.1/virtio-v1.1.pdf
    desc: [Desc; NUM],
    avail: Avail,
    pad1: PaddedPage,
    used: Used,
    pad2: PaddedPage,

    free: [bool; NUM], // is a descriptor free?
    used_idx: u16,
    info: [Info; NUM],
    ops: [BlkReq; NUM],
}

pub static DISK: SpinLock<Disk> = SpinLock::new(Disk::new());

impl Disk {
    const fn new() -> Self {
        Self {
            pad1: PaddedPage {},
            desc: array![_ => Desc::new(); NUM],
            avail: Avail::new(),
            used: Used::new(),
            pad2: PaddedPage {},
            free: [false; NUM],
            used_idx: 0,
            info: array![_ => Info::new(); NUM],
            ops: array![_ => BlkReq::new(); NUM],
        }
    }

    pub unsafe fn init(&mut self) {
        if read(VIRTIO_MMIO_MAGIC_VALUE) != 0x74726976
            || read(VIRTIO_MMIO_VERSION) != 1
            || read(VIRTIO_MMIO_DEVICE_ID) != 2
            || read(VIRTIO_MMIO_VENDOR_ID) != 0x554d4551
        {
            panic!("could not find virtio disk");
        }

        let mut status: u32 = 0;
        status |= VIRTIO_CONFIG_S_ACKNOWLEDGE;
        write(VIRTIO_MMIO_STATUS, status);
        status |= VIRTIO_CONFIG_S_DRIVER;
        write(VIRTIO_MMIO_STATUS, status);

        // negotiate features
        let mut features: u32 = read(VIRTIO_MMIO_DEVICE_FEATURES);
        features &= !(1u32 << VIRTIO_BLK_F_RO);
        features &= !(1u32 << VIRTIO_BLK_F_SCSI);
        features &= !(1u32 << VIRTIO_BLK_F_CONFIG_WCE);
        features &= !(1u32 << VIRTIO_BLK_F_MQ);
        features &= !(1u32 << VIRTIO_F_ANY_LAYOUT);
        features &= !(1u32 << VIRTIO_RING_F_EVENT_IDX);
        features &= !(1u32 << VIRTIO_RING_F_INDIRECT_DESC);
        write(VIRTIO_MMIO_DRIVER_FEATURES, features);

        // tell device that feature negotiation is complete.
        status |= VIRTIO_CONFIG_S_FEATURES_OK;
        write(VIRTIO_MMIO_STATUS, status);

        // tell device we're complete ready.
        status |= VIRTIO_CONFIG_S_DRIVER_OK;
        write(VIRTIO_MMIO_STATUS, status);

        write(VIRTIO_MMIO_GUEST_PAGE_SIZE, PAGESIZE as u32);

        // initialize queue 0.
        write(VIRTIO_MMIO_QUEUE_SEL, 0);
        let max: u32 = read(VIRTIO_MMIO_QUEUE_NUM_MAX);
        if max == 0 {
            panic!("virtio disk has no queue 0");
        } else if max < NUM as u32 {
            panic!("virtio disk max queue too short");
        }
        write(VIRTIO_MMIO_QUEUE_NUM, NUM as u32);

        let pfn: usize = (self as *const Disk as usize) >> 12;
        write(VIRTIO_MMIO_QUEUE_PFN, u32::try_from(pfn).unwrap());

        // all NUM descriptors start out unused.
        self.free.iter_mut().for_each(|v| *v = true);
    }

    fn alloc_desc(&mut self) -> Option<usize> {
        let i = self.free.iter().position(|&free| free)?;
        self.free[i] = false;
        Some(i)
    }

    fn free_desc(&mut self, i: usize) {
        self.desc[i] = Desc::new();
        self.free[i] = true;
        unsafe { PROCESS_TABLE.wakeup(self.free_chan()) };
    }

    /// stable address to sleep/wake on while waiting for a descriptor:
    /// the `free` array's own address, since `Disk` never moves (it's a
    /// `static`).
    fn free_chan(&self) -> usize {
        self.free.as_ptr() as usize
    }

    fn free_chain(&mut self, mut i: usize) {
        loop {
            let d = &self.desc[i];
            let next = d.next;
            let has_next = d.flags & VRING_DESC_F_NEXT != 0;
            self.free_desc(i);
            if !has_next {
                break;
            }
            i = next as usize;
        }
    }

    fn alloc3_desc(&mut self) -> Option<[usize; 3]> {
        let mut idx = [0usize; 3];
        for n in 0..3 {
            match self.alloc_desc() {
                Some(d) => idx[n] = d,
                None => {
                    for &d in &idx[..n] {
                        self.free_desc(d);
                    }
                    return None;
                }
            }
        }
        Some(idx)
    }

    /// the block-transfer interface the buffer cache reads and writes
    /// through: three descriptors chained together (request header, the
    /// buffer's own 4 KiB page, a one-byte status), pushed onto the avail
    /// ring and left for `intr` to notice once the device's used ring
    /// catches up.
    pub fn rw(buf: &mut BufGuard, write: bool) {
        let sector = buf.blockno as usize * (BSIZE / 512);

        let mut guard = DISK.lock();

        let idx = loop {
            match guard.alloc3_desc() {
                Some(idx) => break idx,
                None => {
                    // every descriptor is tied up in an in-flight request;
                    // sleep until one of those frees up, rather than spin
                    // while holding the lock that `intr` needs to make
                    // progress.
                    let chan = guard.free_chan();
                    guard = unsafe { CPU_TABLE.my_proc() }.sleep(chan, guard);
                }
            }
        };

        {
            let req = &mut guard.ops[idx[0]];
            req.typed = if write { VIRTIO_BLK_T_OUT } else { VIRTIO_BLK_T_IN };
            req.reserved = 0;
            req.sector = sector;
        }

        guard.desc[idx[0]] = Desc {
            addr: &guard.ops[idx[0]] as *const BlkReq as usize,
            len: mem::size_of::<BlkReq>() as u32,
            flags: VRING_DESC_F_NEXT,
            next: idx[1] as u16,
        };

        guard.desc[idx[1]] = Desc {
            addr: buf.data_ptr_mut() as usize,
            len: BSIZE as u32,
            flags: VRING_DESC_F_NEXT | if write { 0 } else { VRING_DESC_F_WRITE },
            next: idx[2] as u16,
        };

        guard.info[idx[0]].status = 0xff; // device clears this to 0 on success.
        guard.desc[idx[2]] = Desc {
            addr: &guard.info[idx[0]].status as *const u8 as usize,
            len: 1,
            flags: VRING_DESC_F_WRITE,
            next: 0,
        };

        let chan = buf.data_ptr() as usize;
        guard.info[idx[0]].buf_chan = Some(chan);
        guard.info[idx[0]].disk = true;

        let avail_idx = guard.avail.idx as usize % NUM;
        guard.avail.ring[avail_idx] = idx[0] as u16;
        fence(Ordering::SeqCst);
        guard.avail.idx = guard.avail.idx.wrapping_add(1);
        fence(Ordering::SeqCst);

        unsafe { write(VIRTIO_MMIO_QUEUE_NOTIFY, 0) };

        while guard.info[idx[0]].disk {
            guard = unsafe { CPU_TABLE.my_proc() }.sleep(chan, guard);
        }

        guard.free_chain(idx[0]);
    }

    /// drains the used ring, waking whichever sleeper is waiting on each
    /// completed request's buffer.
    pub fn intr(&mut self) {
        unsafe {
            write(
                VIRTIO_MMIO_INTERRUPT_ACK,
                read(VIRTIO_MMIO_INTERRUPT_STATUS) & 0x3,
            );
        }

        fence(Ordering::SeqCst);

        while self.used_idx != self.used.idx {
            fence(Ordering::SeqCst);
            let id = self.used.ring[self.used_idx as usize % NUM].id as usize;

            if self.info[id].status != 0 {
                panic!("virtio disk intr: status {} for desc {}", self.info[id].status, id);
            }

            self.info[id].disk = false;
            if let Some(chan) = self.info[id].buf_chan.take() {
                unsafe { PROCESS_TABLE.wakeup(chan) };
            }

            self.used_idx = self.used_idx.wrapping_add(1);
        }
    }
}

#[inline]
unsafe fn read(offset: usize) -> u32 {
    let src = (VIRTIO0 + offset) as *const u32;
    ptr::read_volatile(src)
}

#[inline]
unsafe fn write(offset: usize, v: u32) {
    let dst = (VIRTIO0 + offset) as *mut u32;
    ptr::write_volatile(dst, v);
}

const VIRTIO_MMIO_MAGIC_VALUE: usize = 0x000;
const VIRTIO_MMIO_VERSION: usize = 0x004;
const VIRTIO_MMIO_DEVICE_ID: usize = 0x008; // device type; 1 is net, 2 is disk
const VIRTIO_MMIO_VENDOR_ID: usize = 0x00c;
const VIRTIO_MMIO_DEVICE_FEATURES: usize = 0x010;
const VIRTIO_MMIO_DRIVER_FEATURES: usize = 0x020;
const VIRTIO_MMIO_GUEST_PAGE_SIZE: usize = 0x028; // page size for PFN, write-only
const VIRTIO_MMIO_QUEUE_SEL: usize = 0x030;
const VIRTIO_MMIO_QUEUE_NUM_MAX: usize = 0x034;
const VIRTIO_MMIO_QUEUE_NUM: usize = 0x038;
const VIRTIO_MMIO_QUEUE_ALIGN: usize = 0x03c;
const VIRTIO_MMIO_QUEUE_PFN: usize = 0x040;
const VIRTIO_MMIO_QUEUE_READY: usize = 0x044;
const VIRTIO_MMIO_QUEUE_NOTIFY: usize = 0x050;
const VIRTIO_MMIO_INTERRUPT_STATUS: usize = 0x060;
const VIRTIO_MMIO_INTERRUPT_ACK: usize = 0x064;
const VIRTIO_MMIO_STATUS: usize = 0x070; // read/write

const VIRTIO_CONFIG_S_ACKNOWLEDGE: u32 = 1;
const VIRTIO_CONFIG_S_DRIVER: u32 = 2;
const VIRTIO_CONFIG_S_DRIVER_OK: u32 = 4;
const VIRTIO_CONFIG_S_FEATURES_OK: u32 = 8;

const VIRTIO_BLK_F_RO: u8 = 5;
const VIRTIO_BLK_F_SCSI: u8 = 7;
const VIRTIO_BLK_F_CONFIG_WCE: u8 = 11;
const VIRTIO_BLK_F_MQ: u8 = 12;
const VIRTIO_F_ANY_LAYOUT: u8 = 27;
const VIRTIO_RING_F_INDIRECT_DESC: u8 = 28;
const VIRTIO_RING_F_EVENT_IDX: u8 = 29;

const VRING_DESC_F_NEXT: u16 = 1; // chained with another descriptor
const VRING_DESC_F_WRITE: u16 = 2; // device writes (vs read)

const VIRTIO_BLK_T_IN: u32 = 0; // read the disk
const VIRTIO_BLK_T_OUT: u32 = 1; // write the disk

#[cfg(test)]
mod tests {
    use crate::param::PAGESIZE;

    use super::*;

    #[test_case]
    fn memory_layout() {
        let disk = DISK.lock();
        assert_eq!(&disk.desc as *const _ as usize % PAGESIZE, 0);
        assert_eq!(&disk.used as *const _ as usize % PAGESIZE, 0);
        assert_eq!(
            &disk.used as *const _ as usize - &disk.desc as *const _ as usize,
            PAGESIZE
        );
    }
}
