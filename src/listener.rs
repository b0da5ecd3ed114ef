//! Progress Reporting
//!
//! Long-running operations (full anonymization runs and local-recoding
//! steps) report progress through a [`ProgressListener`]. Callbacks run
//! synchronously on the caller's thread, inside the engine's own stack.

/// Receiver for progress updates in [0, 1].
///
/// Within one engine call, delivered values are nondecreasing and the last
/// value is 1.0.
pub trait ProgressListener {
    /// Called with the current overall progress in [0, 1]
    fn progress(&mut self, value: f64);
}

/// Listener that discards all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ProgressListener for NoopListener {
    fn progress(&mut self, _value: f64) {}
}

/// Maps [0, 1] sub-progress of an inner operation linearly onto the band
/// `[min, max]` of an outer one. Used by the batched iterative optimizer,
/// where each step owns one slice of the total progress range.
pub struct SubRange<'a, L: ProgressListener + ?Sized> {
    inner: &'a mut L,
    min: f64,
    max: f64,
}

impl<'a, L: ProgressListener + ?Sized> SubRange<'a, L> {
    /// Create a band-mapping wrapper over `inner`. `min` and `max` are
    /// clamped to [0, 1] with `min <= max`.
    pub fn new(inner: &'a mut L, min: f64, max: f64) -> Self {
        let min = min.clamp(0.0, 1.0);
        let max = max.clamp(min, 1.0);
        SubRange { inner, min, max }
    }
}

impl<L: ProgressListener + ?Sized> ProgressListener for SubRange<'_, L> {
    fn progress(&mut self, value: f64) {
        let value = value.clamp(0.0, 1.0);
        self.inner.progress(self.min + value * (self.max - self.min));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<f64>);

    impl ProgressListener for Recorder {
        fn progress(&mut self, value: f64) {
            self.0.push(value);
        }
    }

    #[test]
    fn test_subrange_maps_onto_band() {
        let mut rec = Recorder(Vec::new());
        {
            let mut sub = SubRange::new(&mut rec, 0.25, 0.75);
            sub.progress(0.0);
            sub.progress(0.5);
            sub.progress(1.0);
        }
        assert_eq!(rec.0, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_subrange_clamps_band() {
        let mut rec = Recorder(Vec::new());
        {
            let mut sub = SubRange::new(&mut rec, 0.9, 1.4);
            sub.progress(1.0);
        }
        assert_eq!(rec.0, vec![1.0]);
    }
}
