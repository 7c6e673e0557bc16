//! 有向无环图。
//!
//! 用于描述任务间、主机间的依赖关系。加边前先做可达性检查，
//! 保证图里永远不会出现环。

#[cfg(test)]
mod tests;

use crate::util::safe_set::SafeSet;
use crate::util::sync::RwLockExt;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

pub type Result<T> = std::result::Result<T, Error>;

/// 错误类型
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    VertexNotFound,
    VertexAlreadyExists,
    // 保留原始拼写，外部接口依赖这个名字
    ParnetAlreadyExists,
    ChildAlreadyExists,
    CycleBetweenVertices,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::VertexNotFound => write!(f, "vertex not found"),
            Error::VertexAlreadyExists => write!(f, "vertex already exists"),
            Error::ParnetAlreadyExists => write!(f, "parent of vertex already exists"),
            Error::ChildAlreadyExists => write!(f, "child of vertex already exists"),
            Error::CycleBetweenVertices => write!(f, "cycle between vertices"),
        }
    }
}

impl std::error::Error for Error {}

/// 图中的顶点，身份由 id 决定
pub struct Vertex<V> {
    pub id: String,
    pub value: V,
    pub parents: SafeSet<Arc<Vertex<V>>>,
    pub children: SafeSet<Arc<Vertex<V>>>,
}

impl<V> Vertex<V> {
    fn new(id: String, value: V) -> Arc<Self> {
        Arc::new(Self {
            id,
            value,
            parents: SafeSet::new(),
            children: SafeSet::new(),
        })
    }
}

impl<V> PartialEq for Vertex<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> Eq for Vertex<V> {}

impl<V> Hash for Vertex<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<V> std::fmt::Debug for Vertex<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vertex").field("id", &self.id).finish()
    }
}

pub struct Dag<V> {
    vertices: RwLock<HashMap<String, Arc<Vertex<V>>>>,
}

impl<V> Default for Dag<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Dag<V> {
    pub fn new() -> Self {
        Self {
            vertices: RwLock::new(HashMap::new()),
        }
    }

    /// 添加顶点，id 已存在时报错
    pub fn add_vertex(&self, id: impl Into<String>, value: V) -> Result<()> {
        let mut vertices = self.vertices.write_pe();

        let id = id.into();
        if vertices.contains_key(&id) {
            return Err(Error::VertexAlreadyExists);
        }

        vertices.insert(id.clone(), Vertex::new(id, value));
        Ok(())
    }

    /// 删除顶点，同时摘掉所有关联的边。顶点不存在时静默返回。
    pub fn delete_vertex(&self, id: &str) {
        let mut vertices = self.vertices.write_pe();

        let Some(vertex) = vertices.get(id).cloned() else {
            return;
        };

        for parent in vertex.parents.values() {
            parent.children.delete(&vertex);
        }

        for child in vertex.children.values() {
            child.parents.delete(&vertex);
        }

        vertices.remove(id);
    }

    pub fn get_vertex(&self, id: &str) -> Result<Arc<Vertex<V>>> {
        let vertices = self.vertices.read_pe();
        vertices.get(id).cloned().ok_or(Error::VertexNotFound)
    }

    pub fn len_vertex(&self) -> usize {
        self.vertices.read_pe().len()
    }

    /// 遍历顶点，回调返回 false 时提前结束
    pub fn range_vertex<F: FnMut(&str, &Arc<Vertex<V>>) -> bool>(&self, mut fn_: F) {
        let vertices = self.vertices.read_pe();
        for (k, v) in vertices.iter() {
            if !fn_(k, v) {
                break;
            }
        }
    }

    /// 添加 from -> to 的边。
    ///
    /// to 能到达 from 时说明会成环，拒绝本次插入。重复的直连边也按
    /// 环处理，和既有外部行为保持一致。
    pub fn add_edge(&self, from_vertex_id: &str, to_vertex_id: &str) -> Result<()> {
        let vertices = self.vertices.write_pe();

        if from_vertex_id == to_vertex_id {
            return Err(Error::CycleBetweenVertices);
        }

        let from_vertex = vertices
            .get(from_vertex_id)
            .cloned()
            .ok_or(Error::VertexNotFound)?;
        let to_vertex = vertices
            .get(to_vertex_id)
            .cloned()
            .ok_or(Error::VertexNotFound)?;

        for child in from_vertex.children.values() {
            if child.id == to_vertex_id {
                return Err(Error::CycleBetweenVertices);
            }
        }

        if Self::depth_first_search(&vertices, to_vertex_id, from_vertex_id) {
            return Err(Error::CycleBetweenVertices);
        }

        if !from_vertex.children.add(to_vertex.clone()) {
            return Err(Error::ChildAlreadyExists);
        }

        if !to_vertex.parents.add(from_vertex) {
            return Err(Error::ParnetAlreadyExists);
        }

        Ok(())
    }

    /// 删除 from -> to 的边，两个顶点都必须存在
    pub fn delete_edge(&self, from_vertex_id: &str, to_vertex_id: &str) -> Result<()> {
        let vertices = self.vertices.write_pe();

        let from_vertex = vertices
            .get(from_vertex_id)
            .cloned()
            .ok_or(Error::VertexNotFound)?;
        let to_vertex = vertices
            .get(to_vertex_id)
            .cloned()
            .ok_or(Error::VertexNotFound)?;

        from_vertex.children.delete(&to_vertex);
        to_vertex.parents.delete(&from_vertex);
        Ok(())
    }

    /// from 出发能否到达 to
    fn depth_first_search(
        vertices: &HashMap<String, Arc<Vertex<V>>>,
        from: &str,
        to: &str,
    ) -> bool {
        let Some(start) = vertices.get(from).cloned() else {
            return false;
        };

        let mut successors = HashSet::new();
        let mut stack = vec![start];
        while let Some(vertex) = stack.pop() {
            for child in vertex.children.values() {
                if successors.insert(child.id.clone()) {
                    stack.push(child);
                }
            }
        }

        successors.contains(to)
    }
}
