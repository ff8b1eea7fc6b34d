use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

const NIL: i32 = -1;

#[derive(Clone, Copy)]
struct ClockLink {
    prev: i32,
    next: i32,
    present: bool,
    referenced: bool,
}

impl ClockLink {
    fn empty() -> Self {
        Self {
            prev: NIL,
            next: NIL,
            present: false,
            referenced: false,
        }
    }
}

/// The circular order is kept as a list from the hand position (head) to
/// the most recently inserted entry (tail); rotating moves the head entry
/// to the tail, which is equivalent to advancing the hand.
struct ClockState {
    links: Vec<ClockLink>,
    head: i32,
    tail: i32,
    len: usize,
}

impl ClockState {
    fn new(num_frames: usize) -> Self {
        Self {
            links: vec![ClockLink::empty(); num_frames],
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    fn push_back(&mut self, id: i32, referenced: bool) {
        let link = &mut self.links[id as usize];
        link.present = true;
        link.referenced = referenced;
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
        let ClockLink { prev, next, .. } = self.links[id as usize];
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
        self.links[id as usize] = ClockLink::empty();
        self.len -= 1;
    }

    /// Sweeps the hand: entries with the reference bit set get a second
    /// chance (bit cleared, rotated to the back); the first entry with a
    /// clear bit is removed and returned.
    fn sweep(&mut self) -> Option<i32> {
        if self.len == 0 {
            return None;
        }
        loop {
            let id = self.head;
            if self.links[id as usize].referenced {
                self.links[id as usize].referenced = false;
                self.remove(id);
                self.push_back(id, false);
            } else {
                self.remove(id);
                return Some(id);
            }
        }
    }
}

/// Clock (second-chance) replacement policy.
///
/// Each eligible frame carries a reference bit. Unpinning a frame that is
/// already eligible sets its bit instead of reordering it; the victim sweep
/// clears bits as it passes and evicts the first unreferenced frame.
pub struct ClockReplacer {
    num_frames: usize,
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            state: Mutex::new(ClockState::new(num_frames)),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        self.state.lock().sweep().map(FrameId::new)
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
            state.links[id as usize].referenced = true;
            return;
        }
        if state.len == self.num_frames {
            state.sweep();
        }
        state.push_back(id, false);
    }

    fn size(&self) -> usize {
        self.state.lock().len
    }
}
