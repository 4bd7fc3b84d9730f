//! The platform specific half of root scanning. Everything here assumes a
//! downward growing stack: the stack top is the lowest live address and the
//! stack base the highest.

use std::hint::black_box;

pub const WORD: usize = std::mem::size_of::<usize>();

#[cfg(target_arch = "x86_64")]
const SPILL_WORDS: usize = 6;
#[cfg(target_arch = "aarch64")]
const SPILL_WORDS: usize = 12;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const SPILL_WORDS: usize = 0;

/// Writes every callee saved register into a buffer in this frame, then calls
/// `f` with the current stack top.
///
/// The buffer outlives `f`, and sits above the address `f` receives, so a
/// block referenced only from a register is still found by a scan from that
/// address to the stack base.
#[inline(never)]
pub fn with_spilled_registers<R>(f: impl FnOnce(usize) -> R) -> R {
    let mut registers = [0usize; SPILL_WORDS];

    unsafe { spill_registers(&mut registers) };

    let result = f(stack_pointer());

    black_box(&registers);
    result
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn spill_registers(buf: &mut [usize; SPILL_WORDS]) {
    std::arch::asm!(
        "mov [{0}], rbx",
        "mov [{0} + 8], rbp",
        "mov [{0} + 16], r12",
        "mov [{0} + 24], r13",
        "mov [{0} + 32], r14",
        "mov [{0} + 40], r15",
        in(reg) buf.as_mut_ptr(),
        options(nostack, preserves_flags),
    );
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn spill_registers(buf: &mut [usize; SPILL_WORDS]) {
    std::arch::asm!(
        "stp x19, x20, [{0}]",
        "stp x21, x22, [{0}, #16]",
        "stp x23, x24, [{0}, #32]",
        "stp x25, x26, [{0}, #48]",
        "stp x27, x28, [{0}, #64]",
        "stp x29, x30, [{0}, #80]",
        in(reg) buf.as_mut_ptr(),
        options(nostack, preserves_flags),
    );
}

// No known register file, rely on the compiler having spilled live values
// across the call into this module.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
unsafe fn spill_registers(buf: &mut [usize; SPILL_WORDS]) {
    black_box(buf);
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn stack_pointer() -> usize {
    let sp: usize;

    unsafe {
        std::arch::asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }

    sp
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn stack_pointer() -> usize {
    let sp: usize;

    unsafe {
        std::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }

    sp
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn stack_pointer() -> usize {
    approximate_frame_address()
}

/// The address of a local in the calling frame.
#[inline(always)]
pub fn approximate_frame_address() -> usize {
    let marker = 0usize;

    black_box(&marker) as *const usize as usize
}

/// The highest address of the current thread's stack, if the OS reports it.
#[cfg(target_os = "linux")]
pub fn thread_stack_base() -> Option<usize> {
    unsafe {
        let mut attr: libc::pthread_attr_t = std::mem::zeroed();

        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }

        let mut addr: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut addr, &mut size);

        libc::pthread_attr_destroy(&mut attr);

        if rc != 0 || addr.is_null() {
            return None;
        }

        (addr as usize).checked_add(size)
    }
}

#[cfg(target_os = "macos")]
pub fn thread_stack_base() -> Option<usize> {
    let base = unsafe { libc::pthread_get_stackaddr_np(libc::pthread_self()) } as usize;

    (base != 0).then_some(base)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn thread_stack_base() -> Option<usize> {
    None
}

/// The stack base a collector created here should scan up to: the thread's
/// stack top when known, otherwise the calling frame.
#[inline(always)]
pub fn current_stack_base() -> usize {
    match thread_stack_base() {
        Some(base) => base,
        None => approximate_frame_address(),
    }
}

/// Reads a possibly misaligned word.
///
/// # Safety
///
/// `[addr, addr + WORD)` must be readable.
#[inline(always)]
pub unsafe fn read_word(addr: usize) -> usize {
    std::ptr::read_unaligned(addr as *const usize)
}
