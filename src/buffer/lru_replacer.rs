use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

const NIL: i32 = -1;

/// Intrusive doubly linked list node, indexed by frame id. Frame ids are
/// bounded by the pool size, so the links live in a flat slab.
#[derive(Clone, Copy)]
struct Link {
    prev: i32,
    next: i32,
    present: bool,
}

impl Link {
    fn empty() -> Self {
        Self {
            prev: NIL,
            next: NIL,
            present: false,
        }
    }
}

struct ListState {
    links: Vec<Link>,
    /// Least recently unpinned frame
    head: i32,
    /// Most recently unpinned frame
    tail: i32,
    len: usize,
}

impl ListState {
    fn new(num_frames: usize) -> Self {
        Self {
            links: vec![Link::empty(); num_frames],
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    fn push_back(&mut self, id: i32) {
        let link = &mut self.links[id as usize];
        link.present = true;
        link.prev = self.tail;
        link.next = NIL;
        if self.tail != NIL {
            self.links[self.tail as usize].next = id;
        } else {
            self.head = id;
        }
        self.tail = id;
        self.len += 1;
    }

    fn remove(&mut self, id: i32) {
        let Link { prev, next, .. } = self.links[id as usize];
        if prev != NIL {
            self.links[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.links[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        self.links[id as usize] = Link::empty();
        self.len -= 1;
    }

    fn pop_front(&mut self) -> Option<i32> {
        if self.head == NIL {
            return None;
        }
        let id = self.head;
        self.remove(id);
        Some(id)
    }
}

/// Least-recently-used replacement policy.
///
/// Eligible frames form a queue ordered by unpin time; the victim is the
/// frame whose last unpin is oldest. Unpinning a frame that is already
/// eligible does not refresh its position.
pub struct LruReplacer {
    num_frames: usize,
    state: Mutex<ListState>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            state: Mutex::new(ListState::new(num_frames)),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        self.state.lock().pop_front().map(FrameId::new)
    }

    fn pin(&self, frame_id: FrameId) {
        let id = frame_id.0;
        if id < 0 || id as usize >= self.num_frames {
            return;
        }
        let mut state = self.state.lock();
        if state.links[id as usize].present {
            state.remove(id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let id = frame_id.0;
        if id < 0 || id as usize >= self.num_frames {
            return;
        }
        let mut state = self.state.lock();
        if state.links[id as usize].present {
            return;
        }
        if state.len == self.num_frames {
            state.pop_front();
        }
        state.push_back(id);
    }

    fn size(&self) -> usize {
        self.state.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_empty_victim() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_victim_order() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(FrameId::new(2));
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(3));

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_unpin_present_is_noop() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        // Unpinning 0 again must not move it to the back.
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_pin_removes() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(0));
        // Pinning an absent frame is a no-op.
        replacer.pin(FrameId::new(3));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_capacity_bound() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        // Exceeding capacity drops the least-recent entry first.
        replacer.unpin(FrameId::new(0)); // no-op, still present
        assert_eq!(replacer.size(), 2);
    }
}
