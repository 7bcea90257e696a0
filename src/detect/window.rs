//! Fixed-capacity sliding window of sampled bit-vectors.

/// Circular buffer holding the most recent samples of one block.
///
/// All samples share the same width (the block's input count) and are stored
/// in a single flat allocation; slot `s`, bit `i` lives at `s * width + i`.
/// Pushing past capacity overwrites the oldest sample.
#[derive(Debug, Clone)]
pub struct Window {
    width: usize,
    capacity: usize,
    bits: Vec<bool>,
    /// Slot holding the oldest sample.
    head: usize,
    len: usize,
}

impl Window {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(width: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            width,
            capacity,
            bits: vec![false; width * capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Physical slot of the sample that is `age` positions after the oldest.
    fn slot(&self, age: usize) -> usize {
        (self.head + age) % self.capacity
    }

    /// Append a sample, evicting the oldest one once the window is full.
    ///
    /// Bits beyond the window width are ignored; missing bits read as low.
    pub fn push(&mut self, sample: &[bool]) {
        let slot = if self.is_full() {
            let oldest = self.head;
            self.head = (self.head + 1) % self.capacity;
            oldest
        } else {
            let next = self.slot(self.len);
            self.len += 1;
            next
        };

        let row = &mut self.bits[slot * self.width..(slot + 1) * self.width];
        for (i, bit) in row.iter_mut().enumerate() {
            *bit = sample.get(i).copied().unwrap_or(false);
        }
    }

    /// Chronological history of one input, oldest sample first.
    pub fn history(&self, index: usize) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |age| self.bits[self.slot(age) * self.width + index])
    }

    /// Force one input low in every stored sample.
    pub fn clear_index(&mut self, index: usize) {
        for age in 0..self.len {
            let slot = self.slot(age);
            self.bits[slot * self.width + index] = false;
        }
    }

    /// Change the capacity, keeping as many of the most recent samples as fit.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }

        let keep = self.len.min(capacity);
        let skip = self.len - keep;
        let mut bits = vec![false; self.width * capacity];
        for (dst, age) in (skip..self.len).enumerate() {
            let src = self.slot(age) * self.width;
            bits[dst * self.width..(dst + 1) * self.width]
                .copy_from_slice(&self.bits[src..src + self.width]);
        }

        self.bits = bits;
        self.capacity = capacity;
        self.head = 0;
        self.len = keep;
    }
}

/// True when the history holds at least `run` consecutive high samples.
pub fn has_high_run(history: impl Iterator<Item = bool>, run: usize) -> bool {
    if run == 0 {
        return true;
    }
    let mut current = 0;
    for bit in history {
        if bit {
            current += 1;
            if current >= run {
                return true;
            }
        } else {
            current = 0;
        }
    }
    false
}

/// True when a high sample is directly followed by a low one.
pub fn has_falling_edge(history: impl Iterator<Item = bool>) -> bool {
    let mut previous = false;
    for bit in history {
        if previous && !bit {
            return true;
        }
        previous = bit;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    fn history_string(window: &Window, index: usize) -> String {
        window
            .history(index)
            .map(|b| if b { '1' } else { '0' })
            .collect()
    }

    #[test]
    fn push_fills_then_evicts_oldest() {
        let mut window = Window::new(2, 3);
        window.push(&bits("10"));
        window.push(&bits("01"));
        assert_eq!(window.len(), 2);
        assert!(!window.is_full());

        window.push(&bits("11"));
        window.push(&bits("00"));
        assert!(window.is_full());
        assert_eq!(window.len(), 3);
        assert_eq!(history_string(&window, 0), "010");
        assert_eq!(history_string(&window, 1), "110");
    }

    #[test]
    fn zero_capacity_behaves_as_one() {
        let mut window = Window::new(1, 0);
        assert_eq!(window.capacity(), 1);
        window.push(&bits("1"));
        window.push(&bits("0"));
        assert_eq!(history_string(&window, 0), "0");
    }

    #[test]
    fn clear_index_only_touches_one_input() {
        let mut window = Window::new(2, 3);
        for _ in 0..4 {
            window.push(&bits("11"));
        }
        window.clear_index(0);
        assert_eq!(history_string(&window, 0), "000");
        assert_eq!(history_string(&window, 1), "111");
    }

    #[test]
    fn short_samples_pad_low() {
        let mut window = Window::new(3, 2);
        window.push(&bits("1"));
        assert_eq!(history_string(&window, 0), "1");
        assert_eq!(history_string(&window, 2), "0");
    }

    #[test]
    fn shrink_keeps_most_recent_samples() {
        let mut window = Window::new(1, 5);
        for s in ["1", "0", "1", "1", "0", "1"] {
            window.push(&bits(s));
        }
        assert_eq!(history_string(&window, 0), "01101");

        window.resize(3);
        assert_eq!(window.capacity(), 3);
        assert_eq!(history_string(&window, 0), "101");

        window.push(&bits("0"));
        assert_eq!(history_string(&window, 0), "010");
    }

    #[test]
    fn grow_keeps_everything_and_accepts_more() {
        let mut window = Window::new(1, 2);
        for s in ["1", "0", "1"] {
            window.push(&bits(s));
        }
        window.resize(4);
        assert_eq!(window.len(), 2);
        assert_eq!(history_string(&window, 0), "01");

        window.push(&bits("1"));
        window.push(&bits("1"));
        assert!(window.is_full());
        assert_eq!(history_string(&window, 0), "0111");
    }

    #[test]
    fn high_run_detection() {
        assert!(has_high_run(bits("0111").into_iter(), 3));
        assert!(!has_high_run(bits("1101").into_iter(), 3));
        assert!(has_high_run(bits("1").into_iter(), 1));
        assert!(!has_high_run(bits("").into_iter(), 1));
    }

    #[test]
    fn falling_edge_detection() {
        assert!(has_falling_edge(bits("010").into_iter()));
        assert!(has_falling_edge(bits("10").into_iter()));
        assert!(!has_falling_edge(bits("0011").into_iter()));
        assert!(!has_falling_edge(bits("0").into_iter()));
    }
}
