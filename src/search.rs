//! Search state shared by the iterative targeters.
//!
//! `BestResult` is an online arg-min over trial encodes: each trial is offered
//! with its size, and it replaces the held one only when strictly closer to
//! the target. `SearchBounds` is the narrowing `[low, high]` quality window of
//! the image binary search.

/// One encode attempt.
#[derive(Clone, Debug)]
pub struct Trial<P> {
    pub params: P,
    pub bytes: Vec<u8>,
    pub size_kb: f64,
}

impl<P> Trial<P> {
    pub fn new(params: P, bytes: Vec<u8>) -> Self {
        let size_kb = bytes.len() as f64 / crate::request::BYTES_PER_KB;
        Self {
            params,
            bytes,
            size_kb,
        }
    }
}

#[derive(Debug)]
pub struct BestResult<P> {
    target_kb: f64,
    best: Option<Trial<P>>,
    best_diff: f64,
}

impl<P> BestResult<P> {
    pub fn new(target_kb: f64) -> Self {
        Self {
            target_kb,
            best: None,
            best_diff: f64::INFINITY,
        }
    }

    /// Keeps `trial` if it is strictly closer to the target than the current
    /// best. Returns whether it was kept.
    pub fn offer(&mut self, trial: Trial<P>) -> bool {
        let diff = (trial.size_kb - self.target_kb).abs();
        if diff < self.best_diff {
            self.best_diff = diff;
            self.best = Some(trial);
            true
        } else {
            false
        }
    }

    /// Unconditionally installs `trial` as the best.
    pub fn replace(&mut self, trial: Trial<P>) {
        self.best_diff = (trial.size_kb - self.target_kb).abs();
        self.best = Some(trial);
    }

    pub fn get(&self) -> Option<&Trial<P>> {
        self.best.as_ref()
    }

    pub fn into_inner(self) -> Option<Trial<P>> {
        self.best
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchBounds {
    pub low: u8,
    pub high: u8,
}

impl SearchBounds {
    pub fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    pub fn is_open(&self) -> bool {
        self.low <= self.high
    }

    pub fn mid(&self) -> u8 {
        ((self.low as u16 + self.high as u16) / 2) as u8
    }

    /// Narrows around `mid` after a trial: an overshoot lowers the ceiling,
    /// anything else raises the floor.
    pub fn narrow(&mut self, mid: u8, overshoot: bool) {
        if overshoot {
            match mid.checked_sub(1) {
                Some(high) => self.high = high,
                None => self.low = self.high.saturating_add(1),
            }
        } else {
            self.low = mid.saturating_add(1);
        }
    }
}
