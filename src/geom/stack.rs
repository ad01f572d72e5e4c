/// Fixed-capacity LIFO stack stored inline, used by hierarchy traversal so a
/// query never allocates.
///
/// Pushing past `N` entries panics: a hierarchy deeper than the traversal
/// stack is a construction bug, not a runtime condition.
#[derive(Debug, Clone)]
pub struct SmallStack<T: Copy + Default, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> SmallStack<T, N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) {
        assert!(
            self.len < N,
            "traversal stack overflow: hierarchy is deeper than {N} levels"
        );
        self.items[self.len] = item;
        self.len += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.items[self.len])
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Copy + Default, const N: usize> Default for SmallStack<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut stack: SmallStack<u32, 4> = SmallStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "traversal stack overflow")]
    fn test_overflow_panics() {
        let mut stack: SmallStack<u32, 2> = SmallStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
    }
}
