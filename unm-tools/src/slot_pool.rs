/// 下标稳定的槽位池。
///
/// 元素被取走后槽位保留为 `None`，其余元素的下标不会改变；
/// `trim_tail` 只回收尾部连续的空槽。
#[derive(Clone, Debug)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
}

impl<T> SlotPool<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// 放入第一个空槽，没有空槽时追加到尾部，返回槽位下标
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(value);
            return idx;
        }

        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// 取走元素，槽位留空
    pub fn take(&mut self, idx: usize) -> Option<T> {
        self.slots.get_mut(idx).and_then(Option::take)
    }

    /// 线性扫描，返回第一个满足条件的元素
    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<(usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .find_map(|(idx, slot)| match slot {
                Some(value) if pred(value) => Some((idx, value)),
                _ => None,
            })
    }

    pub fn count(&self, mut pred: impl FnMut(&T) -> bool) -> usize {
        self.iter().filter(|(_, value)| pred(value)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (idx, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_mut().map(|value| (idx, value)))
    }

    /// 清空不满足条件的槽位（不移动其他元素），返回移除数量
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|value| !keep(value)) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// 回收尾部连续的空槽
    pub fn trim_tail(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// 已占用槽位数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 包括空槽在内的槽位总数
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_fills_holes_before_appending() {
        let mut pool = SlotPool::new();
        assert_eq!(pool.insert('a'), 0);
        assert_eq!(pool.insert('b'), 1);
        assert_eq!(pool.insert('c'), 2);

        assert_eq!(pool.take(1), Some('b'));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.slot_count(), 3);

        assert_eq!(pool.insert('d'), 1);
        assert_eq!(pool.get(1), Some(&'d'));
    }

    #[test]
    fn retain_keeps_indices_stable() {
        let mut pool = SlotPool::new();
        for value in [1, 2, 3, 4] {
            pool.insert(value);
        }

        let removed = pool.retain(|value| value % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(pool.get(1), Some(&2));
        assert_eq!(pool.get(3), Some(&4));
        assert_eq!(pool.get(0), None);
    }

    #[test]
    fn trim_tail_only_drops_trailing_holes() {
        let mut pool = SlotPool::new();
        for value in 0..5 {
            pool.insert(value);
        }
        pool.take(1);
        pool.take(3);
        pool.take(4);

        pool.trim_tail();
        assert_eq!(pool.slot_count(), 3);
        assert_eq!(pool.get(2), Some(&2));
        assert_eq!(pool.get(1), None);
    }

    #[test]
    fn find_mut_returns_first_match() {
        let mut pool = SlotPool::new();
        pool.insert(10);
        pool.insert(20);
        pool.insert(30);

        let (idx, value) = pool.find_mut(|v| *v > 15).unwrap();
        assert_eq!(idx, 1);
        *value = 21;
        assert_eq!(pool.get(1), Some(&21));
        assert_eq!(pool.count(|v| *v > 15), 2);
    }
}
