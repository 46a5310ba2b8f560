//! Swapchain-image → last-submission fence table.

/// Remembers, per swapchain image, the fence of the last submission that
/// rendered into it.
///
/// Each index holds at most one fence; registering a new one hands back the
/// previous entry so the caller can wait on it first.
#[derive(Debug, Clone)]
pub struct ImagesInFlight<F> {
    fences: Vec<Option<F>>,
}

impl<F> ImagesInFlight<F> {
    pub fn new(image_count: usize) -> Self {
        let mut fences = Vec::with_capacity(image_count);
        fences.resize_with(image_count, || None);
        Self { fences }
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    pub fn get(&self, image_index: usize) -> Option<&F> {
        self.fences.get(image_index).and_then(Option::as_ref)
    }

    /// Registers `fence` for `image_index`, returning the fence it replaces.
    ///
    /// # Panics
    ///
    /// If `image_index` is outside the table.
    pub fn replace(&mut self, image_index: usize, fence: F) -> Option<F> {
        self.fences[image_index].replace(fence)
    }

    /// Forgets every entry and resizes to `image_count`.
    ///
    /// Only valid once all registered fences are known to be signaled.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize_with(image_count, || None);
    }

    pub fn occupied(&self) -> usize {
        self.fences.iter().filter(|f| f.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_empty() {
        let table: ImagesInFlight<u32> = ImagesInFlight::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.occupied(), 0);
        assert!(table.get(1).is_none());
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut table = ImagesInFlight::new(2);
        assert_eq!(table.replace(1, 10), None);
        assert_eq!(table.replace(1, 11), Some(10));
        assert_eq!(table.get(1), Some(&11));
        assert_eq!(table.occupied(), 1);
    }

    #[test]
    fn test_reset_resizes_and_clears() {
        let mut table = ImagesInFlight::new(2);
        table.replace(0, 'a');
        table.reset(4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.occupied(), 0);
    }
}
