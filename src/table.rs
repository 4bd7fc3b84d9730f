use super::error::fatal;
use super::record::{AllocRecord, RecordId};

/// An open chained hash table mapping block addresses to their records.
///
/// Records live in a slab and are chained per bucket through
/// [`AllocRecord::next`], so a [`RecordId`] stays valid across a resize.
/// The bucket count is always a power of two.
pub struct AllocTable {
    buckets: Vec<Option<RecordId>>,
    slots: Vec<Option<AllocRecord>>,
    vacant: Vec<RecordId>,
    len: usize,
}

impl AllocTable {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "table capacity must be a power of two"
        );

        Self {
            buckets: vec![None; capacity],
            slots: vec![],
            vacant: vec![],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn insert(&mut self, mut record: AllocRecord) -> RecordId {
        let bucket = self.bucket_of(record.address());

        record.next = self.buckets[bucket];

        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(record);
                id
            }
            None => {
                self.slots.push(Some(record));
                RecordId(self.slots.len() - 1)
            }
        };

        self.buckets[bucket] = Some(id);
        self.len += 1;
        id
    }

    pub fn find(&self, address: usize) -> Option<RecordId> {
        self.chain(self.bucket_of(address))
            .find(|id| self.record(*id).address() == address)
    }

    pub fn get(&self, id: RecordId) -> Option<&AllocRecord> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut AllocRecord> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Unlinks the record with this identity from its bucket chain and
    /// returns it. A record that is not in the chain its address hashes to
    /// means the table is corrupt, which is fatal.
    pub fn remove(&mut self, id: RecordId) -> AllocRecord {
        let Some(record) = self.get(id) else {
            fatal(format_args!("removing vacant record slot {:?}", id));
        };
        let bucket = self.bucket_of(record.address());
        let next = record.next;

        let mut prev: Option<RecordId> = None;
        let mut cursor = self.buckets[bucket];

        while let Some(current) = cursor {
            if current == id {
                match prev {
                    None => self.buckets[bucket] = next,
                    Some(prev) => self.record_mut(prev).next = next,
                }

                self.vacant.push(id);
                self.len -= 1;

                let mut removed = self.slots[id.index()]
                    .take()
                    .unwrap_or_else(|| fatal(format_args!("record slot {:?} emptied", id)));

                removed.next = None;
                return removed;
            }

            prev = cursor;
            cursor = self.record(current).next;
        }

        fatal(format_args!(
            "record {:?} for address {:#x} is missing from bucket {}",
            id,
            self.record(id).address(),
            bucket
        ))
    }

    /// Rehashes every record into a bucket array of `new_capacity` buckets.
    pub fn resize(&mut self, new_capacity: usize) {
        assert!(
            new_capacity.is_power_of_two(),
            "table capacity must be a power of two"
        );

        let old_buckets = std::mem::replace(&mut self.buckets, vec![None; new_capacity]);

        for head in old_buckets {
            let mut cursor = head;

            while let Some(id) = cursor {
                let bucket = self.bucket_of(self.record(id).address());
                let new_next = self.buckets[bucket];
                let record = self.record_mut(id);

                cursor = record.next;
                record.next = new_next;
                self.buckets[bucket] = Some(id);
            }
        }
    }

    pub fn head(&self, bucket: usize) -> Option<RecordId> {
        self.buckets[bucket]
    }

    /// Walks the ids chained in `bucket`, head first.
    pub fn chain(&self, bucket: usize) -> Chain<'_> {
        Chain {
            table: self,
            cursor: self.head(bucket),
        }
    }

    /// Every tracked record, in bucket order.
    pub fn records(&self) -> impl Iterator<Item = &AllocRecord> + '_ {
        (0..self.capacity())
            .flat_map(move |bucket| self.chain(bucket))
            .map(move |id| self.record(id))
    }

    fn record(&self, id: RecordId) -> &AllocRecord {
        self.get(id)
            .unwrap_or_else(|| fatal(format_args!("chain points at vacant slot {:?}", id)))
    }

    fn record_mut(&mut self, id: RecordId) -> &mut AllocRecord {
        match self.slots.get_mut(id.index()).and_then(Option::as_mut) {
            Some(record) => record,
            None => fatal(format_args!("chain points at vacant slot {:?}", id)),
        }
    }

    fn bucket_of(&self, address: usize) -> usize {
        (hash(address) as usize) & (self.buckets.len() - 1)
    }
}

pub struct Chain<'a> {
    table: &'a AllocTable,
    cursor: Option<RecordId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = RecordId;

    fn next(&mut self) -> Option<RecordId> {
        let id = self.cursor?;

        self.cursor = self.table.record(id).next;
        Some(id)
    }
}

// 64 bit finalizer from murmur3, block addresses share their low bits so
// they need mixing before being masked down to a bucket.
fn hash(address: usize) -> u64 {
    let mut h = address as u64;

    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}
