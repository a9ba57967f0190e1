use std::fmt;

/// 计数器状态变化的边沿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// 0 -> 1
    Raised,
    /// 1 -> 0
    Lowered,
    Unchanged,
}

/// 在计数为 0 时调用了 `release`，通常意味着调用方的配对逻辑有误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Underflow;

impl fmt::Display for Underflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release called on a flag that is not set")
    }
}

impl std::error::Error for Underflow {}

/// 引用计数的布尔标志。
///
/// 多个来源（窗口失焦、设置面板等）可以同时置位，只有计数在 0 和 1 之间
/// 跨越时外部可见的状态才会变化。
#[derive(Debug, Default, Clone)]
pub struct RefFlag {
    count: u32,
}

impl RefFlag {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn acquire(&mut self) -> Edge {
        self.count = self.count.saturating_add(1);
        if self.count == 1 {
            Edge::Raised
        } else {
            Edge::Unchanged
        }
    }

    /// 计数已为 0 时返回 `Underflow`，计数保持不变
    pub fn release(&mut self) -> Result<Edge, Underflow> {
        match self.count {
            0 => Err(Underflow),
            1 => {
                self.count = 0;
                Ok(Edge::Lowered)
            }
            _ => {
                self.count -= 1;
                Ok(Edge::Unchanged)
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_outer_transitions_are_edges() {
        let mut flag = RefFlag::new();
        assert_eq!(flag.acquire(), Edge::Raised);
        assert_eq!(flag.acquire(), Edge::Unchanged);
        assert!(flag.is_set());

        assert_eq!(flag.release(), Ok(Edge::Unchanged));
        assert!(flag.is_set());
        assert_eq!(flag.release(), Ok(Edge::Lowered));
        assert!(!flag.is_set());
    }

    #[test]
    fn release_below_zero_is_reported() {
        let mut flag = RefFlag::new();
        assert_eq!(flag.release(), Err(Underflow));
        assert_eq!(flag.count(), 0);

        assert_eq!(flag.acquire(), Edge::Raised);
    }
}
