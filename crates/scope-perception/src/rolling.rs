//! Fixed-window moving average.

/// Arithmetic mean over the last `N` pushed values.
///
/// Slots start at zero, so the mean ramps up over the first `N` pushes and
/// equals a constant input exactly once the window has been filled.
///
/// # Example
///
/// ```
/// use scope_perception::RollingAverage;
///
/// let mut avg = RollingAverage::<5>::new();
/// for _ in 0..5 {
///     avg.push(20.0);
/// }
/// assert_eq!(avg.mean(), 20.0);
/// ```
#[derive(Debug, Clone)]
pub struct RollingAverage<const N: usize> {
    slots: [f32; N],
    next: usize,
}

impl<const N: usize> RollingAverage<N> {
    pub const fn new() -> Self {
        Self { slots: [0.0; N], next: 0 }
    }

    /// Overwrite the oldest slot with `value` and return the new mean.
    pub fn push(&mut self, value: f32) -> f32 {
        self.slots[self.next] = value;
        self.next = (self.next + 1) % N;
        self.mean()
    }

    pub fn mean(&self) -> f32 {
        self.slots.iter().sum::<f32>() / N as f32
    }
}

impl<const N: usize> Default for RollingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramps_up_from_zero() {
        let mut avg = RollingAverage::<4>::new();
        assert_eq!(avg.push(8.0), 2.0);
        assert_eq!(avg.push(8.0), 4.0);
    }

    #[test]
    fn converges_after_one_full_window() {
        let mut avg = RollingAverage::<5>::new();
        for _ in 0..3 {
            avg.push(-100.0);
        }
        for _ in 0..5 {
            avg.push(12.5);
        }
        assert!((avg.mean() - 12.5).abs() < 1e-5);
    }

    #[test]
    fn oldest_value_is_evicted() {
        let mut avg = RollingAverage::<2>::new();
        avg.push(1.0);
        avg.push(3.0);
        assert_eq!(avg.push(5.0), 4.0);
    }
}
