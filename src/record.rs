use std::fmt;

pub const ALLOC_ALIGN: usize = 8;
const MARK_BIT: usize = 0x1;

/// A block size rounded to [`ALLOC_ALIGN`] whose lowest bit doubles as the
/// mark flag. Rounding guarantees the low three bits of a real size are zero.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SizeTag(usize);

impl SizeTag {
    pub fn new(size: usize) -> Self {
        debug_assert!(size % ALLOC_ALIGN == 0, "unrounded block size");

        Self(size)
    }

    pub fn size(&self) -> usize {
        self.0 & !MARK_BIT
    }

    pub fn is_marked(&self) -> bool {
        self.0 & MARK_BIT != 0
    }

    pub fn marked(&self) -> Self {
        Self(self.0 | MARK_BIT)
    }

    pub fn with_mark_cleared(&self) -> Self {
        Self(self.0 & !MARK_BIT)
    }
}

impl fmt::Debug for SizeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeTag")
            .field("size", &self.size())
            .field("marked", &self.is_marked())
            .finish()
    }
}

/// Rounds `size` up to the next multiple of [`ALLOC_ALIGN`], or `None` if that
/// overflows.
pub fn round_up(size: usize) -> Option<usize> {
    Some(size.checked_add(ALLOC_ALIGN - 1)? & !(ALLOC_ALIGN - 1))
}

/// Identity of a record inside the tracking table. Stable for as long as the
/// record is tracked.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(pub(crate) usize);

impl RecordId {
    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

/// Metadata for one tracked heap block.
#[derive(Debug)]
pub struct AllocRecord {
    address: usize,
    tag: SizeTag,
    pub(crate) next: Option<RecordId>,
}

impl AllocRecord {
    pub fn new(address: usize, size: usize) -> Self {
        Self {
            address,
            tag: SizeTag::new(size),
            next: None,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn size(&self) -> usize {
        self.tag.size()
    }

    pub fn is_marked(&self) -> bool {
        self.tag.is_marked()
    }

    pub(crate) fn set_mark(&mut self) {
        self.tag = self.tag.marked();
    }

    pub(crate) fn clear_mark(&mut self) {
        self.tag = self.tag.with_mark_cleared();
    }
}
