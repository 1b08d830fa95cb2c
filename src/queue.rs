use tokio::sync::oneshot;
use tokio::time::Instant;

/// The unit of work a submitter hands to a limiter.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// One admitted-but-not-yet-executed call, together with everything needed to
/// order it and to wake its submitter.
///
/// Dropping a request without running it drops `done`, which wakes the
/// waiting submitter with a receive error rather than leaving it blocked.
pub(crate) struct PendingRequest {
    pub job: Job,
    /// Request priority; lower runs first.
    pub niceness: i32,
    /// Submission time, for FIFO ordering among equal niceness.
    pub queued_at: Instant,
    /// Submission counter breaking ties below timestamp resolution.
    pub seq: u64,
    /// Fired exactly once, after the job has run.
    pub done: oneshot::Sender<()>,
}

impl PendingRequest {
    fn precedes(&self, other: &Self) -> bool {
        (self.niceness, self.queued_at, self.seq) < (other.niceness, other.queued_at, other.seq)
    }
}

/// An array-backed binary min-heap of pending requests, ordered by
/// (niceness, submission time, submission sequence).
///
/// The ordering is strict and total, so extraction order is deterministic
/// for a fixed insertion sequence.
pub(crate) struct PendingQueue {
    items: Vec<PendingRequest>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert in O(log n).
    pub fn push(&mut self, request: PendingRequest) {
        self.items.push(request);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the highest-priority request in O(log n), or `None`
    /// if nothing is queued.
    pub fn pop(&mut self) -> Option<PendingRequest> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let request = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        request
    }

    /// Drop every queued request, waking each submitter with an error.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index].precedes(&self.items[parent]) {
                self.items.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < self.items.len() && self.items[left].precedes(&self.items[smallest]) {
                smallest = left;
            }
            if right < self.items.len() && self.items[right].precedes(&self.items[smallest]) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}
