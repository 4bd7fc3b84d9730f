use sweepstack::global;

use std::ptr::NonNull;

// A singly linked list whose nodes live in collector owned blocks. Nothing is
// ever freed by hand, dropping the head is enough.
#[repr(C)]
struct Node {
    next: *mut Node,
    val: usize,
}

struct LinkedList {
    head: *mut Node,
    len: usize,
}

impl LinkedList {
    fn new() -> Self {
        Self {
            head: std::ptr::null_mut(),
            len: 0,
        }
    }

    fn push_front(&mut self, val: usize) {
        let block: NonNull<u8> =
            global::alloc(std::mem::size_of::<Node>()).expect("out of memory");
        let node = block.as_ptr().cast::<Node>();

        unsafe {
            node.write(Node {
                next: self.head,
                val,
            })
        };

        self.head = node;
        self.len += 1;
    }

    fn iter(&self) -> LinkedListIter<'_> {
        LinkedListIter {
            next: self.head,
            _list: self,
        }
    }
}

struct LinkedListIter<'a> {
    next: *mut Node,
    _list: &'a LinkedList,
}

impl<'a> Iterator for LinkedListIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next.is_null() {
            return None;
        }

        let node = unsafe { &*self.next };

        self.next = node.next;
        Some(node.val)
    }
}

#[inline(never)]
fn build_and_drop(len: usize) {
    let mut list = LinkedList::new();

    for i in 0..len {
        list.push_front(i);
    }

    let sum: usize = list.iter().sum();

    assert_eq!(sum, len * (len - 1) / 2);
    println!("built a list of {} nodes, sum {}", list.len, sum);
}

fn main() {
    global::init().expect("collector already initialized");

    let mut list = LinkedList::new();

    for i in 0..10_000 {
        list.push_front(i);
    }

    for _ in 0..10 {
        build_and_drop(10_000);
    }

    global::collect().expect("collector initialized");

    // The long lived list survived every collection above.
    assert_eq!(list.iter().count(), 10_000);

    let metrics = global::metrics().expect("collector initialized");

    println!("collections: {}", metrics.collections);
    println!("blocks reclaimed: {}", metrics.collected_total);
    println!("blocks live: {}", metrics.live_count);
    println!("table buckets: {}", metrics.capacity);

    global::shutdown();
}
