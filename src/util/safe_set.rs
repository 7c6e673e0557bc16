//! 线程安全的集合。


use crate::util::sync::RwLockExt;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::RwLock;

pub struct SafeSet<T> {
    data: RwLock<HashSet<T>>,
}

impl<T> Default for SafeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SafeSet<T> {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashSet::new()),
        }
    }
}

impl<T: Eq + Hash + Clone> SafeSet<T> {
    /// 添加元素，已存在时返回 false。
    ///
    /// 读锁检查后才升级为写锁，两次加锁之间其他线程可能插入同一个值，
    /// 此时两边都会返回 true。重复插入本身无副作用，调用方不能依赖
    /// true 的唯一性。
    pub fn add(&self, v: T) -> bool {
        {
            let data = self.data.read_pe();
            if data.contains(&v) {
                return false;
            }
        }

        self.data.write_pe().insert(v);
        true
    }

    pub fn delete(&self, v: &T) {
        self.data.write_pe().remove(v);
    }

    pub fn contains(&self, v: &T) -> bool {
        self.data.read_pe().contains(v)
    }

    /// 判断所有给定元素是否都在集合内
    pub fn contains_all(&self, vals: &[T]) -> bool {
        let data = self.data.read_pe();
        vals.iter().all(|v| data.contains(v))
    }

    pub fn len(&self) -> usize {
        self.data.read_pe().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 遍历集合，回调返回 false 时提前结束
    pub fn range<F: FnMut(&T) -> bool>(&self, mut fn_: F) {
        let data = self.data.read_pe();
        for v in data.iter() {
            if !fn_(v) {
                break;
            }
        }
    }

    pub fn values(&self) -> Vec<T> {
        let mut result = Vec::new();
        self.range(|v| {
            result.push(v.clone());
            true
        });

        result
    }

    pub fn clear(&self) {
        self.data.write_pe().clear();
    }
}

impl<T: Eq + Hash + Clone + std::fmt::Debug> std::fmt::Debug for SafeSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.data.read_pe().iter()).finish()
    }
}
